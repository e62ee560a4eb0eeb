//! Template Resolver (spec §4.E): expands `{{name.variant}}` placeholders
//! into provider-specific quoted table references, preserving source order.

use crate::model::NameVariant;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unresolved template key: {0}")]
    UnresolvedKey(String),
}

/// A provider's table-reference quoting rule (spec §4.E). Implementors are
/// the opaque provider objects the core treats as capability objects
/// elsewhere (spec §1); this is the one method the template resolver needs
/// from them.
pub trait TableQuoter {
    fn quote_table(&self, raw_table_name: &str) -> String;
}

/// `"tableA"` (spec §4.E, "Generic offline").
pub struct GenericOfflineQuoter;

impl TableQuoter for GenericOfflineQuoter {
    fn quote_table(&self, raw_table_name: &str) -> String {
        format!("\"{raw_table_name}\"")
    }
}

/// `` `project.dataset.tableA` `` (spec §4.E, "BigQuery-style").
pub struct BigQueryQuoter {
    pub project: String,
    pub dataset: String,
}

impl TableQuoter for BigQueryQuoter {
    fn quote_table(&self, raw_table_name: &str) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, raw_table_name)
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // NAME "." VARIANT, where both may contain any character except `}`
    // (spec §6). The whole captured group is used verbatim as the
    // replacements-map key ("name.variant").
    RE.get_or_init(|| Regex::new(r"\{\{([^}]*)\}\}").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    /// The quoted table reference substituted in place of the placeholder.
    pub template: String,
    /// The raw replacement value (backing table name) as given in
    /// `replacements`.
    pub source: String,
}

/// Expands every `{{key}}` placeholder in `template` via `replacements`,
/// quoting the substituted table name with `quoter`. Fails with
/// [`TemplateError::UnresolvedKey`] on the first placeholder whose key is
/// absent from `replacements`.
pub fn template_replace(
    template: &str,
    replacements: &HashMap<String, String>,
    quoter: &dyn TableQuoter,
) -> Result<String, TemplateError> {
    let re = placeholder_re();
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in re.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let key = caps.get(1).unwrap().as_str();

        let raw_table = replacements
            .get(key)
            .ok_or_else(|| TemplateError::UnresolvedKey(key.to_string()))?;

        result.push_str(&template[last_end..whole.start()]);
        result.push_str(&quoter.quote_table(raw_table));
        last_end = whole.end();
    }
    result.push_str(&template[last_end..]);

    Ok(result)
}

/// Scans `template` left-to-right for placeholders, emitting one
/// `SourceMapping` per occurrence in the order they appear (duplicates
/// produce duplicate entries, spec §4.E).
pub fn get_source_mapping(
    template: &str,
    replacements: &HashMap<String, String>,
    quoter: &dyn TableQuoter,
) -> Result<Vec<SourceMapping>, TemplateError> {
    let re = placeholder_re();
    let mut mappings = Vec::new();

    for caps in re.captures_iter(template) {
        let key = caps.get(1).unwrap().as_str();
        let raw_table = replacements
            .get(key)
            .ok_or_else(|| TemplateError::UnresolvedKey(key.to_string()))?;
        mappings.push(SourceMapping {
            template: quoter.quote_table(raw_table),
            source: raw_table.clone(),
        });
    }

    Ok(mappings)
}

/// Iterates the transformation's declared source list (the authoritative
/// order downstream runners address positionally as `source_0`,
/// `source_1`, ...) and looks each one up in `replacements`. Fails on the
/// first declared source missing from `replacements`.
pub fn get_ordered_source_mappings(
    declared_sources: &[NameVariant],
    replacements: &HashMap<String, String>,
    quoter: &dyn TableQuoter,
) -> Result<Vec<SourceMapping>, TemplateError> {
    declared_sources
        .iter()
        .map(|nv| {
            let key = nv.key();
            let raw_table = replacements
                .get(&key)
                .ok_or_else(|| TemplateError::UnresolvedKey(key.clone()))?;
            Ok(SourceMapping {
                template: quoter.quote_table(raw_table),
                source: raw_table.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacements(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_placeholder_with_empty_variant() {
        let repl = replacements(&[("S.", "S_table")]);
        let resolved = template_replace("SELECT * FROM {{S.}}", &repl, &GenericOfflineQuoter).unwrap();
        assert_eq!(resolved, "SELECT * FROM \"S_table\"");
    }

    #[test]
    fn bigquery_quoter_produces_fully_qualified_backtick_name() {
        let repl = replacements(&[("n.v", "t")]);
        let quoter = BigQueryQuoter {
            project: "p".to_string(),
            dataset: "d".to_string(),
        };
        let resolved = template_replace("FROM {{n.v}}", &repl, &quoter).unwrap();
        assert_eq!(resolved, "FROM `p.d.t`");
    }

    #[test]
    fn missing_key_is_unresolved_template_key_error() {
        let repl = replacements(&[]);
        let err = template_replace("{{missing.v}}", &repl, &GenericOfflineQuoter).unwrap_err();
        assert_eq!(err, TemplateError::UnresolvedKey("missing.v".to_string()));
    }

    #[test]
    fn empty_template_resolves_to_empty_string() {
        let repl = replacements(&[]);
        assert_eq!(template_replace("", &repl, &GenericOfflineQuoter).unwrap(), "");
    }

    #[test]
    fn duplicate_placeholders_produce_duplicate_mappings_in_order() {
        let repl = replacements(&[("a.v", "A_table"), ("b.v", "B_table")]);
        let mappings = get_source_mapping(
            "{{a.v}} JOIN {{b.v}} JOIN {{a.v}}",
            &repl,
            &GenericOfflineQuoter,
        )
        .unwrap();

        assert_eq!(
            mappings,
            vec![
                SourceMapping {
                    template: "\"A_table\"".to_string(),
                    source: "A_table".to_string()
                },
                SourceMapping {
                    template: "\"B_table\"".to_string(),
                    source: "B_table".to_string()
                },
                SourceMapping {
                    template: "\"A_table\"".to_string(),
                    source: "A_table".to_string()
                },
            ]
        );
    }

    #[test]
    fn ordered_mappings_is_same_length_as_declared_sources() {
        let repl = replacements(&[("a.v", "A_table"), ("b.v", "B_table")]);
        let declared = vec![NameVariant::new("b", "v"), NameVariant::new("a", "v")];

        let mappings = get_ordered_source_mappings(&declared, &repl, &GenericOfflineQuoter).unwrap();

        assert_eq!(mappings.len(), declared.len());
        assert_eq!(mappings[0].source, "B_table");
        assert_eq!(mappings[1].source, "A_table");
    }

    #[test]
    fn declared_source_missing_from_replacements_is_an_error() {
        let repl = replacements(&[]);
        let declared = vec![NameVariant::new("a", "v")];
        assert!(get_ordered_source_mappings(&declared, &repl, &GenericOfflineQuoter).is_err());
    }

    #[test]
    fn template_round_trip_matches_ordered_mapping_for_declared_order() {
        let repl = replacements(&[("S.", "S_table")]);
        let declared = vec![NameVariant::new("S", "")];

        let resolved = template_replace("SELECT * FROM {{S.}}", &repl, &GenericOfflineQuoter).unwrap();
        let scanned = get_source_mapping("SELECT * FROM {{S.}}", &repl, &GenericOfflineQuoter).unwrap();
        let ordered = get_ordered_source_mappings(&declared, &repl, &GenericOfflineQuoter).unwrap();

        assert_eq!(resolved, "SELECT * FROM \"S_table\"");
        assert_eq!(scanned, ordered);
    }
}
