//! Stream classification.
//!
//! A descriptor's declared name determines the stream's role once, by exact
//! match against the configured names; the uid -> role mapping is remembered
//! for the rest of the run and never re-evaluated.

use std::collections::HashMap;

use dataex_core::DescriptorDoc;
use tracing::debug;

use crate::config::ExportConfig;

/// Semantic purpose of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    /// The dense image stream.
    Primary,
    /// The one-shot position snapshot.
    Baseline,
    /// A sparse scalar monitor.
    Monitor,
    /// Anything else; stored but inert.
    Other,
}

/// Maps descriptors to roles and remembers the assignment.
#[derive(Debug, Default)]
pub struct StreamClassifier {
    primary: String,
    baseline: String,
    monitor: String,
    roles: HashMap<String, StreamRole>,
}

impl StreamClassifier {
    /// Build a classifier from the configured stream names.
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            primary: config.primary_stream.clone(),
            baseline: config.baseline_stream.clone(),
            monitor: config.monitor_stream.clone(),
            roles: HashMap::new(),
        }
    }

    /// Classify a descriptor and record the assignment for its uid.
    ///
    /// Re-classifying a descriptor already seen returns the stored role.
    pub fn classify(&mut self, doc: &DescriptorDoc) -> StreamRole {
        if let Some(&role) = self.roles.get(&doc.uid) {
            return role;
        }
        let role = if doc.name == self.primary {
            StreamRole::Primary
        } else if doc.name == self.baseline {
            StreamRole::Baseline
        } else if doc.name == self.monitor {
            StreamRole::Monitor
        } else {
            StreamRole::Other
        };
        debug!(stream = %doc.name, uid = %doc.uid, ?role, "classified stream");
        self.roles.insert(doc.uid.clone(), role);
        role
    }

    /// Role previously assigned to a descriptor uid.
    pub fn role_of(&self, descriptor_uid: &str) -> Option<StreamRole> {
        self.roles.get(descriptor_uid).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(uid: &str, name: &str) -> DescriptorDoc {
        DescriptorDoc::new(uid, "r1", name)
    }

    #[test]
    fn roles_follow_configured_names() {
        let mut classifier = StreamClassifier::new(&ExportConfig::default());
        assert_eq!(
            classifier.classify(&descriptor("d1", "primary")),
            StreamRole::Primary,
        );
        assert_eq!(
            classifier.classify(&descriptor("d2", "baseline")),
            StreamRole::Baseline,
        );
        assert_eq!(
            classifier.classify(&descriptor("d3", "zps_pi_r_monitor")),
            StreamRole::Monitor,
        );
        assert_eq!(
            classifier.classify(&descriptor("d4", "lakeshore")),
            StreamRole::Other,
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let mut classifier = StreamClassifier::new(&ExportConfig::default());
        let doc = descriptor("d1", "primary");
        let first = classifier.classify(&doc);
        let second = classifier.classify(&doc);
        assert_eq!(first, second);
        assert_eq!(classifier.role_of("d1"), Some(StreamRole::Primary));
    }

    #[test]
    fn unknown_uid_has_no_role() {
        let classifier = StreamClassifier::new(&ExportConfig::default());
        assert_eq!(classifier.role_of("missing"), None);
    }
}
