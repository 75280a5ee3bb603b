//! Declarative extraction rules.
//!
//! Each adapter declares a flat table of [`RuleSpec`]s: a rule name, the
//! skin it belongs to, a regex, and the meaning of each capture group.
//! Skins are tried in declaration order; the first skin that matches wins,
//! except where the caller asks for every skin's matches combined.

use std::collections::HashMap;

use regex::Regex;

use crate::error::AdapterError;

/// Extraction rule names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleId {
    BoardTitle,
    UserName,
    LoginRequired,
    LoginHiddenField,
    LoginSuccess,
    ThreadAuthor,
    SearchNoResults,
    SearchHits,
    SearchNextPage,
    OlderContent,
    PostContents,
    ThreadId,
    PrevPage,
    NextPage,
    ForumTitle,
    ForumTopics,
    ListingNextPage,
    TopicPosts,
    AssetRefs,
}

impl RuleId {
    pub fn name(self) -> &'static str {
        match self {
            RuleId::BoardTitle => "board_title",
            RuleId::UserName => "user_name",
            RuleId::LoginRequired => "login_required",
            RuleId::LoginHiddenField => "login_hidden_field",
            RuleId::LoginSuccess => "login_success",
            RuleId::ThreadAuthor => "thread_author",
            RuleId::SearchNoResults => "search_no_results",
            RuleId::SearchHits => "search_hits",
            RuleId::SearchNextPage => "search_next_page",
            RuleId::OlderContent => "older_content",
            RuleId::PostContents => "post_contents",
            RuleId::ThreadId => "thread_id",
            RuleId::PrevPage => "prev_page",
            RuleId::NextPage => "next_page",
            RuleId::ForumTitle => "forum_title",
            RuleId::ForumTopics => "forum_topics",
            RuleId::ListingNextPage => "listing_next_page",
            RuleId::TopicPosts => "topic_posts",
            RuleId::AssetRefs => "asset_refs",
        }
    }
}

/// Meaning of a capture group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Value,
    Name,
    Kind,
    Title,
    Ts,
    Author,
    Forum,
    ForumId,
    Topic,
    TopicId,
    PostId,
    Start,
    Content,
}

/// One declared rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub rule: RuleId,
    pub skin: &'static str,
    pub pattern: &'static str,

    /// Field for capture group 1, 2, ...
    pub fields: &'static [Field],
}

/// Captured fields of one match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: Vec<(Field, String)>,
}

impl Record {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed, non-empty value of a field.
    pub fn text(&self, field: Field) -> Option<String> {
        self.get(field)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug)]
struct Rule {
    skin: &'static str,
    regex: Regex,
    fields: &'static [Field],
}

impl Rule {
    fn record(&self, caps: &regex::Captures<'_>) -> Record {
        let values = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, field)| caps.get(i + 1).map(|m| (*field, m.as_str().to_string())))
            .collect();
        Record { values }
    }
}

/// Compiled rules, grouped by name in declaration order.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: HashMap<RuleId, Vec<Rule>>,
}

impl RuleSet {
    /// Compile a rule table.
    pub fn compile(specs: &[RuleSpec]) -> Result<Self, AdapterError> {
        let mut rules: HashMap<RuleId, Vec<Rule>> = HashMap::new();
        for spec in specs {
            let regex = Regex::new(spec.pattern).map_err(|source| AdapterError::InvalidRule {
                rule: spec.rule.name(),
                skin: spec.skin,
                source,
            })?;
            rules.entry(spec.rule).or_default().push(Rule {
                skin: spec.skin,
                regex,
                fields: spec.fields,
            });
        }
        Ok(Self { rules })
    }

    fn for_rule(&self, id: RuleId) -> &[Rule] {
        self.rules.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any skin's rule matches.
    pub fn is_match(&self, id: RuleId, html: &str) -> bool {
        self.for_rule(id).iter().any(|r| r.regex.is_match(html))
    }

    /// First match of the first skin that matches.
    pub fn first(&self, id: RuleId, html: &str) -> Option<Record> {
        self.for_rule(id)
            .iter()
            .find_map(|r| r.regex.captures(html).map(|caps| r.record(&caps)))
    }

    /// Trimmed `Field::Value` of the first match.
    pub fn value(&self, id: RuleId, html: &str) -> Option<String> {
        self.first(id, html).and_then(|r| r.text(Field::Value))
    }

    /// Every match of the first skin that matches at all.
    pub fn all(&self, id: RuleId, html: &str) -> Vec<Record> {
        for rule in self.for_rule(id) {
            let records: Vec<Record> = rule
                .regex
                .captures_iter(html)
                .map(|caps| rule.record(&caps))
                .collect();
            if !records.is_empty() {
                tracing::trace!(rule = id.name(), skin = rule.skin, matches = records.len(), "Rule matched");
                return records;
            }
        }
        Vec::new()
    }

    /// Every match of every skin, in skin order.
    pub fn combined(&self, id: RuleId, html: &str) -> Vec<Record> {
        self.for_rule(id)
            .iter()
            .flat_map(|rule| {
                rule.regex
                    .captures_iter(html)
                    .map(move |caps| rule.record(&caps))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[RuleSpec] = &[
        RuleSpec {
            rule: RuleId::BoardTitle,
            skin: "a",
            pattern: r"<h1>(.*?)</h1>",
            fields: &[Field::Value],
        },
        RuleSpec {
            rule: RuleId::BoardTitle,
            skin: "b",
            pattern: r"<title>(.*?)</title>",
            fields: &[Field::Value],
        },
        RuleSpec {
            rule: RuleId::PostContents,
            skin: "a",
            pattern: r#"<p id="(\d+)">(.*?)</p>"#,
            fields: &[Field::PostId, Field::Content],
        },
        RuleSpec {
            rule: RuleId::PostContents,
            skin: "b",
            pattern: r#"<div id="(\d+)">(.*?)</div>"#,
            fields: &[Field::PostId, Field::Content],
        },
    ];

    #[test]
    fn test_first_skin_wins() {
        let rules = RuleSet::compile(SPECS).unwrap();
        let html = "<title>B</title><h1> A </h1>";
        assert_eq!(rules.value(RuleId::BoardTitle, html), Some("A".into()));
        assert_eq!(rules.value(RuleId::BoardTitle, "<title>B</title>"), Some("B".into()));
        assert_eq!(rules.value(RuleId::BoardTitle, "nothing"), None);
    }

    #[test]
    fn test_all_uses_single_skin_combined_uses_every_skin() {
        let rules = RuleSet::compile(SPECS).unwrap();
        let html = r#"<p id="1">one</p><p id="2">two</p><div id="3">three</div>"#;

        let all = rules.all(RuleId::PostContents, html);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].get(Field::PostId), Some("2"));

        let combined = rules.combined(RuleId::PostContents, html);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[2].get(Field::Content), Some("three"));
    }

    #[test]
    fn test_unknown_rule_matches_nothing() {
        let rules = RuleSet::compile(SPECS).unwrap();
        assert!(!rules.is_match(RuleId::LoginRequired, "anything"));
        assert!(rules.all(RuleId::SearchHits, "anything").is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let bad = [RuleSpec {
            rule: RuleId::UserName,
            skin: "broken",
            pattern: r"(unclosed",
            fields: &[Field::Value],
        }];
        let err = RuleSet::compile(&bad).unwrap_err();
        assert!(err.to_string().contains("user_name"));
    }
}
