//! Access Filter Builder (C4, §4.2).
//!
//! The historical bug this module exists to prevent: nesting a previously-built
//! filter inside a new `must` array. `AccessFilterBuilder` is append-only — every
//! `with_*` call extends the same flat `Vec<FilterCondition>` in place — and the
//! only way to get a store filter out of it is `build()`, which hands back an
//! immutable, already-flat [`AccessFilter`]. There is no constructor that accepts
//! an existing filter to wrap.

use qdrant_client::qdrant::condition::ConditionOneOf;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::{Condition, FieldCondition, Filter, Match, RepeatedStrings};

use ragcore_core::Passage;

/// One flat condition. Kept store-agnostic so both the vector adapter (qdrant) and
/// the keyword adapter (tantivy) can consume the same prefilter.
#[derive(Debug, Clone)]
pub enum FilterCondition {
    Equals { field: &'static str, value: String },
    OneOf { field: &'static str, values: Vec<String> },
}

/// A flat conjunction of conditions, already built — the only public way to obtain
/// one is [`AccessFilterBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct AccessFilter {
    conditions: Vec<FilterCondition>,
}

impl AccessFilter {
    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// Translate to the vector store's native filter grammar. Always a single flat
    /// `must` array — never a `must` containing a nested `Filter`.
    pub fn into_qdrant(self) -> Filter {
        let must = self
            .conditions
            .into_iter()
            .map(|c| match c {
                FilterCondition::Equals { field, value } => Condition {
                    condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                        key: field.to_string(),
                        r#match: Some(Match {
                            match_value: Some(MatchValue::Keyword(value)),
                        }),
                        ..Default::default()
                    })),
                },
                // A disjunction over one field is itself a single flat condition:
                // qdrant's `keywords` match matches set membership in one shot, so
                // this never needs a `should` array nested inside `must`.
                FilterCondition::OneOf { field, values } => Condition {
                    condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                        key: field.to_string(),
                        r#match: Some(Match {
                            match_value: Some(MatchValue::Keywords(RepeatedStrings {
                                strings: values,
                            })),
                        }),
                        ..Default::default()
                    })),
                },
            })
            .collect();

        Filter {
            must,
            ..Default::default()
        }
    }
}

/// Append-only flat-conjunction builder (§4.2, §9, regression-tested in §8).
pub struct AccessFilterBuilder {
    conditions: Vec<FilterCondition>,
}

impl AccessFilterBuilder {
    /// `tenantId == tenant_id` — hard isolation, always present, never optional.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            conditions: vec![FilterCondition::Equals {
                field: "tenant_id",
                value: tenant_id.into(),
            }],
        }
    }

    /// `acl ∈ {userId} ∪ groupIds ∪ {"public"}`.
    pub fn with_acl(mut self, user_id: &str, group_ids: &[String]) -> Self {
        let mut values: Vec<String> = Vec::with_capacity(group_ids.len() + 2);
        values.push(user_id.to_string());
        values.extend(group_ids.iter().cloned());
        values.push("public".to_string());
        self.conditions.push(FilterCondition::OneOf {
            field: "acl",
            values,
        });
        self
    }

    /// Soft mode: disjunction over `preferred_languages`, with `"en"` appended as a
    /// fallback. Strict mode: collapses to equality on the first preferred language
    /// only, dropping the fallback — since a passage carries one `language` value,
    /// "turning a disjunction into a conjunction" (§4.2) is only meaningful as
    /// narrowing to the caller's primary language with no fallback.
    pub fn with_language(mut self, preferred_languages: &[String], strict: bool) -> Self {
        if preferred_languages.is_empty() {
            return self;
        }
        if strict {
            self.conditions.push(FilterCondition::Equals {
                field: "language",
                value: preferred_languages[0].clone(),
            });
        } else {
            let mut values = preferred_languages.to_vec();
            if !values.iter().any(|l| l == "en") {
                values.push("en".to_string());
            }
            self.conditions.push(FilterCondition::OneOf {
                field: "language",
                values,
            });
        }
        self
    }

    /// `docId == X` when the caller restricts to one document.
    pub fn with_doc_id(mut self, doc_id: Option<&str>) -> Self {
        if let Some(doc_id) = doc_id {
            self.conditions.push(FilterCondition::Equals {
                field: "doc_id",
                value: doc_id.to_string(),
            });
        }
        self
    }

    pub fn build(self) -> AccessFilter {
        AccessFilter {
            conditions: self.conditions,
        }
    }
}

/// Post-filter verification (§4.2): re-check tenant and ACL membership after results
/// return. Any passage failing this is dropped and logged as an access anomaly.
pub fn validate_access(passage: &Passage, tenant_id: &str, user_id: &str, group_ids: &[String]) -> bool {
    passage.payload.tenant_id == tenant_id && passage.acl_permits(user_id, group_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_is_a_flat_conjunction_of_conditions() {
        let filter = AccessFilterBuilder::new("tenant-a")
            .with_acl("user-1", &["group-1".to_string()])
            .with_language(&["en".to_string()], false)
            .with_doc_id(Some("doc-1"))
            .build();
        assert_eq!(filter.conditions().len(), 4);
    }

    #[test]
    fn strict_language_drops_fallback() {
        let filter = AccessFilterBuilder::new("tenant-a")
            .with_language(&["fr".to_string()], true)
            .build();
        match &filter.conditions()[1] {
            FilterCondition::Equals { field, value } => {
                assert_eq!(*field, "language");
                assert_eq!(value, "fr");
            }
            _ => panic!("expected an Equals condition"),
        }
    }

    #[test]
    fn qdrant_filter_has_no_nested_must() {
        let filter = AccessFilterBuilder::new("tenant-a")
            .with_acl("user-1", &[])
            .build()
            .into_qdrant();
        assert!(filter.must_not.is_empty());
        assert!(filter.should.is_empty());
        assert_eq!(filter.must.len(), 2);
    }
}
