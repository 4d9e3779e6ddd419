//! The listener's rule table.
//!
//! Rules are kept sorted by ascending priority. The implicit default rule
//! sits after all of them and forwards to the listener's default target
//! group.

use webtier_core::validate::validate_listener_rules;
use webtier_core::{DefinitionError, ListenerSpec, RuleAction};

use crate::pattern::PathPattern;

/// A listener rule with compiled patterns.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub priority: u32,
    pub patterns: Vec<PathPattern>,
    pub action: RuleAction,
}

impl CompiledRule {
    /// A rule matches when any of its patterns does.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// The rule a request resolved to.
#[derive(Debug, Clone, Copy)]
pub struct Selected<'a> {
    /// `None` for the implicit default rule.
    pub priority: Option<u32>,
    pub action: &'a RuleAction,
}

/// Priority-ordered rules plus the implicit default.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<CompiledRule>,
    default_action: RuleAction,
}

impl RuleTable {
    /// Build a table from a listener spec.
    ///
    /// Fails with `DuplicatePriority` when two rules share a priority, and
    /// with the other rule-shape errors from `validate_listener_rules`.
    pub fn new(listener: &ListenerSpec) -> Result<Self, DefinitionError> {
        validate_listener_rules(&listener.rules)?;

        let mut rules = listener
            .rules
            .iter()
            .map(|r| {
                Ok(CompiledRule {
                    priority: r.priority,
                    patterns: r
                        .path_patterns
                        .iter()
                        .map(|p| PathPattern::compile(p))
                        .collect::<Result<_, DefinitionError>>()?,
                    action: r.action.clone(),
                })
            })
            .collect::<Result<Vec<_>, DefinitionError>>()?;
        rules.sort_by_key(|r| r.priority);

        Ok(Self {
            rules,
            default_action: RuleAction::Forward {
                target_group: listener.default_target_group.clone(),
            },
        })
    }

    /// Pick exactly one rule for `path`.
    pub fn select(&self, path: &str) -> Selected<'_> {
        match self.rules.iter().find(|r| r.matches(path)) {
            Some(rule) => Selected {
                priority: Some(rule.priority),
                action: &rule.action,
            },
            None => Selected {
                priority: None,
                action: &self.default_action,
            },
        }
    }

    /// Rules in evaluation order (the default rule is not included).
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Every target group any action forwards to, default first.
    pub fn forward_targets(&self) -> Vec<String> {
        let mut groups = Vec::new();
        for action in std::iter::once(&self.default_action).chain(self.rules.iter().map(|r| &r.action)) {
            if let RuleAction::Forward { target_group } = action
                && !groups.contains(target_group)
            {
                groups.push(target_group.clone());
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webtier_core::ListenerRuleSpec;

    fn fixed(body: &str) -> RuleAction {
        RuleAction::FixedResponse {
            status_code: 200,
            content_type: "text/plain".to_string(),
            body: body.to_string(),
        }
    }

    fn listener(rules: Vec<(u32, &str, RuleAction)>) -> ListenerSpec {
        ListenerSpec {
            port: 80,
            open: true,
            default_target_group: "web".to_string(),
            rules: rules
                .into_iter()
                .map(|(priority, pattern, action)| ListenerRuleSpec {
                    priority,
                    path_patterns: vec![pattern.to_string()],
                    action,
                })
                .collect(),
        }
    }

    #[test]
    fn duplicate_priority_is_definition_error() {
        let err = RuleTable::new(&listener(vec![
            (5, "/a", fixed("a")),
            (5, "/b", fixed("b")),
        ]))
        .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicatePriority { priority: 5 });
    }

    #[test]
    fn lowest_priority_number_wins() {
        // Declared out of order on purpose.
        let table = RuleTable::new(&listener(vec![
            (20, "/docs/*", fixed("broad")),
            (10, "/docs/api*", fixed("narrow")),
        ]))
        .unwrap();

        let sel = table.select("/docs/api/v1");
        assert_eq!(sel.priority, Some(10));
        assert_eq!(*sel.action, fixed("narrow"));

        assert_eq!(table.select("/docs/guide").priority, Some(20));
    }

    #[test]
    fn unmatched_path_uses_default_forward() {
        let table = RuleTable::new(&listener(vec![(5, "/static", fixed("s"))])).unwrap();
        let sel = table.select("/index.html");
        assert_eq!(sel.priority, None);
        assert_eq!(
            *sel.action,
            RuleAction::Forward {
                target_group: "web".to_string()
            }
        );
    }

    #[test]
    fn any_condition_of_a_rule_matches() {
        let mut spec = listener(vec![]);
        spec.rules.push(ListenerRuleSpec {
            priority: 1,
            path_patterns: vec!["/a".to_string(), "/b/*".to_string()],
            action: fixed("ab"),
        });
        let table = RuleTable::new(&spec).unwrap();
        assert_eq!(table.select("/a").priority, Some(1));
        assert_eq!(table.select("/b/c").priority, Some(1));
        assert_eq!(table.select("/c").priority, None);
    }

    #[test]
    fn forward_targets_lists_each_group_once() {
        let table = RuleTable::new(&listener(vec![
            (1, "/api/*", RuleAction::Forward { target_group: "api".to_string() }),
            (2, "/v2/*", RuleAction::Forward { target_group: "api".to_string() }),
            (3, "/static", fixed("s")),
        ]))
        .unwrap();
        assert_eq!(table.forward_targets(), vec!["web".to_string(), "api".to_string()]);
    }
}
