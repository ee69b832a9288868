//! Entry enrichment plugins.
//!
//! A stack provider may attach cross-PR stack metadata to entries during
//! sync. Providers run synchronously between normalization and the store
//! write; they may read side-band state but must not touch the network,
//! and they must leave identity and scope keys alone.

use crate::config::Config;
use crate::models::Entry;

/// Hook point for stack-provider plugins.
pub trait StackProvider: Send + Sync {
    /// Plugin name for logs.
    fn name(&self) -> &str;

    /// Attach enrichment fields to an entry in place.
    fn enrich(&self, entry: &mut Entry);
}

/// The plugin set for a configuration.
///
/// The Graphite provider itself ships separately; when it is not linked in,
/// an enabled config degrades to no enrichment rather than an error.
pub fn active_plugins(config: &Config) -> Vec<Box<dyn StackProvider>> {
    if config.graphite_enabled {
        log::debug!("graphite enrichment enabled but no provider is linked; skipping");
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentSubtype, EntryType, GraphiteInfo, PrState};
    use chrono::{TimeZone, Utc};

    /// Provider that stamps every entry with a fixed stack position.
    struct StaticStackProvider(GraphiteInfo);

    impl StackProvider for StaticStackProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn enrich(&self, entry: &mut Entry) {
            entry.graphite = Some(self.0.clone());
        }
    }

    #[test]
    fn test_provider_attaches_stack_metadata() {
        let created_at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 0, 0).unwrap();
        let mut entry = Entry {
            id: "IC_1".to_string(),
            repo: "octo/widgets".to_string(),
            pr: 7,
            pr_state: PrState::Open,
            pr_author: "alice".to_string(),
            pr_title: "t".to_string(),
            pr_branch: "b".to_string(),
            pr_labels: None,
            entry_type: EntryType::Comment,
            subtype: Some(CommentSubtype::IssueComment),
            author: "bob".to_string(),
            author_login: None,
            body: None,
            state: None,
            file: None,
            line: None,
            database_id: None,
            thread_resolved: None,
            file_activity_after: None,
            reactions: None,
            graphite: None,
            url: None,
            created_at,
            captured_at: created_at,
        };

        let provider = StaticStackProvider(GraphiteInfo {
            stack_id: "stack-1".to_string(),
            stack_position: 2,
            stack_size: 3,
        });
        provider.enrich(&mut entry);

        let info = entry.graphite.unwrap();
        assert_eq!(info.stack_position, 2);
        assert_eq!(provider.name(), "static");
        // Identity and scope keys stay untouched.
        assert_eq!(entry.id, "IC_1");
        assert_eq!(entry.pr, 7);
    }

    #[test]
    fn test_disabled_config_yields_no_plugins() {
        let config = Config::default();
        assert!(active_plugins(&config).is_empty());
    }
}
