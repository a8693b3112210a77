//! An ordered set of protocol matchers, as compiled from configuration.

use crate::matcher::Matcher;

/// The full, ordered matcher list shared across all listeners. Order is
/// preserved from configuration and is the tie-break order during
/// classification.
#[derive(Debug, Clone, Default)]
pub struct ProtocolConfig {
    matchers: Vec<Matcher>,
}

impl ProtocolConfig {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// The subset of matchers whose protocol is a key of `protocols`,
    /// preserving global order. This is the per-listener matcher
    /// intersection, in the global matcher order.
    pub fn intersect(&self, protocols: impl Fn(&str) -> bool) -> Vec<Matcher> {
        self.matchers
            .iter()
            .filter(|m| protocols(m.protocol()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Target;

    #[test]
    fn intersect_preserves_order_and_drops_unmapped_protocols() {
        let cfg = ProtocolConfig::new(vec![
            Matcher::compile_string("http", Target::Line, "GET "),
            Matcher::compile_string("ssh", Target::Raw, "SSH-2.0"),
            Matcher::compile_string("redis", Target::Raw, "*"),
        ]);

        let kept = cfg.intersect(|p| p == "http" || p == "redis");
        let protocols: Vec<&str> = kept.iter().map(Matcher::protocol).collect();
        assert_eq!(protocols, vec!["http", "redis"]);
    }
}
