//! Type classification and planning of the parameters to persist.

use crate::parser::NoiseFilter;
use crate::types::{MetadataDump, ParameterKind, ParameterName, ParameterValue, RawValue};
use serde::{Deserialize, Serialize};

/// Classifies a raw value.
///
/// The checks run in order: integer, float, rational. The first match makes
/// the value numeric. Multi-line values are always text.
#[must_use]
pub fn classify(value: &RawValue) -> ParameterKind {
    match value {
        RawValue::Text(text) => {
            let text = text.trim();
            if text.parse::<i64>().is_ok() || text.parse::<f64>().is_ok() {
                ParameterKind::Numeric
            } else {
                ParameterKind::Text
            }
        }
        RawValue::Rational(_) => ParameterKind::Numeric,
        RawValue::Lines(_) => ParameterKind::Text,
    }
}

/// Restricts which field names are considered at all.
///
/// A non-empty `find` list is a whitelist and takes precedence; `exclude` only
/// applies when no whitelist is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagFilter {
    pub find: Vec<String>,
    pub exclude: Vec<String>,
}

impl TagFilter {
    #[must_use]
    pub fn whitelist<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            find: names.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    #[must_use]
    pub fn blacklist<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            find: Vec::new(),
            exclude: names.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        if self.find.is_empty() {
            !self.exclude.iter().any(|n| n == name)
        } else {
            self.find.iter().any(|n| n == name)
        }
    }
}

/// A field that will be written to a parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedParameter {
    pub name: String,
    pub kind: ParameterKind,
    /// `true` when the name is not yet registered in the schema.
    pub is_new: bool,
    /// Values to append, in persistence order.
    pub values: Vec<ParameterValue>,
}

/// Plans the parameters for one dump.
///
/// Names already in `registry` keep their registered kind; unseen names are
/// classified fresh. Fields whose values all disappear (empty numeric text,
/// only noise lines) are left out entirely.
#[must_use]
pub fn build_parameters(
    dump: &MetadataDump,
    registry: &[ParameterName],
    filter: &TagFilter,
    noise: &NoiseFilter,
) -> Vec<PlannedParameter> {
    dump.iter()
        .filter(|(name, _)| filter.admits(name))
        .filter_map(|(name, raw)| {
            let registered = registry.iter().find(|p| p.name == name);
            let kind = registered.map_or_else(|| classify(raw), |p| p.kind);
            let values = values_for(name, kind, raw, noise);
            (!values.is_empty()).then(|| PlannedParameter {
                name: name.to_owned(),
                kind,
                is_new: registered.is_none(),
                values,
            })
        })
        .collect()
}

/// The values `raw` yields when persisted as `kind`. Values that cannot be
/// represented as `kind` are dropped with a warning.
#[must_use]
pub fn values_for(
    name: &str,
    kind: ParameterKind,
    raw: &RawValue,
    noise: &NoiseFilter,
) -> Vec<ParameterValue> {
    match (kind, raw) {
        (ParameterKind::Numeric, RawValue::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Vec::new();
            }
            text.parse::<f64>().map_or_else(
                |_| {
                    tracing::warn!(name, value = text, "numeric parameter has non-numeric value");
                    Vec::new()
                },
                |n| vec![ParameterValue::Numeric(n)],
            )
        }
        (ParameterKind::Numeric, RawValue::Rational(r)) => {
            r.to_f64().map(ParameterValue::Numeric).into_iter().collect()
        }
        (ParameterKind::Numeric, RawValue::Lines(_)) => {
            tracing::warn!(name, "multi-line value registered as numeric; skipped");
            Vec::new()
        }
        (ParameterKind::Text, RawValue::Text(text)) => vec![ParameterValue::Text(text.clone())],
        (ParameterKind::Text, RawValue::Rational(r)) => vec![ParameterValue::Text(r.to_string())],
        (ParameterKind::Text, RawValue::Lines(lines)) => noise
            .informational(lines)
            .into_iter()
            .rev()
            .map(ParameterValue::Text)
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{Rational, Schema};

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn lines(items: &[&str]) -> RawValue {
        RawValue::Lines(items.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_classification_chain() {
        assert_eq!(classify(&text("42")), ParameterKind::Numeric);
        assert_eq!(classify(&text(" -7 ")), ParameterKind::Numeric);
        assert_eq!(classify(&text("3.5e2")), ParameterKind::Numeric);
        assert_eq!(classify(&RawValue::Rational(Rational::new(1, 3))), ParameterKind::Numeric);
        assert_eq!(classify(&text("512 px")), ParameterKind::Text);
        assert_eq!(classify(&text("")), ParameterKind::Text);
        assert_eq!(classify(&lines(&["12"])), ParameterKind::Text);
    }

    #[test]
    fn test_whitelist_wins_over_blacklist() {
        let filter = TagFilter {
            find: vec!["a".into()],
            exclude: vec!["a".into(), "b".into()],
        };
        assert!(filter.admits("a"));
        assert!(!filter.admits("b"));
        assert!(!filter.admits("c"));

        let filter = TagFilter::blacklist(["b"]);
        assert!(filter.admits("a"));
        assert!(!filter.admits("b"));
        assert!(TagFilter::default().admits("anything"));
    }

    #[test]
    fn test_lines_are_filtered_and_reversed() {
        let mut dump = MetadataDump::new();
        dump.insert(
            "image_information",
            lines(&["-----", "  Width: 512", "", "Reading tags", "Height: 256"]),
        );
        let planned = build_parameters(&dump, &[], &TagFilter::default(), &NoiseFilter::default());
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].kind, ParameterKind::Text);
        assert!(planned[0].is_new);
        assert_eq!(
            planned[0].values,
            vec![
                ParameterValue::Text("Height: 256".into()),
                ParameterValue::Text("Width: 512".into()),
            ]
        );
    }

    #[test]
    fn test_registry_kind_is_reused() {
        let schema = Schema::new("http://example.org/bioformats", "bioformats");
        let registry = vec![ParameterName {
            schema,
            name: "pixels".into(),
            kind: ParameterKind::Text,
        }];
        let mut dump = MetadataDump::new();
        dump.insert("pixels", text("512"));
        dump.insert("ratio", RawValue::Rational(Rational::new(1, 4)));

        let planned =
            build_parameters(&dump, &registry, &TagFilter::default(), &NoiseFilter::default());
        assert_eq!(planned[0].kind, ParameterKind::Text);
        assert!(!planned[0].is_new);
        assert_eq!(planned[0].values, vec![ParameterValue::Text("512".into())]);
        assert_eq!(planned[1].kind, ParameterKind::Numeric);
        assert_eq!(planned[1].values, vec![ParameterValue::Numeric(0.25)]);
    }

    #[test]
    fn test_values_that_vanish_are_dropped() {
        let schema = Schema::new("ns", "n");
        let registry = vec![
            ParameterName {
                schema: schema.clone(),
                name: "exposure".into(),
                kind: ParameterKind::Numeric,
            },
            ParameterName {
                schema,
                name: "log".into(),
                kind: ParameterKind::Numeric,
            },
        ];
        let mut dump = MetadataDump::new();
        dump.insert("exposure", text("  "));
        dump.insert("log", lines(&["a", "b"]));
        dump.insert("noise", lines(&["-----", "Reading metadata", ""]));
        dump.insert("zero", RawValue::Rational(Rational::new(1, 0)));

        let planned =
            build_parameters(&dump, &registry, &TagFilter::default(), &NoiseFilter::default());
        assert!(planned.is_empty(), "got {planned:?}");
    }

    #[test]
    fn test_filter_limits_names_in_dump_order() {
        let mut dump = MetadataDump::new();
        dump.insert("b", text("x"));
        dump.insert("a", text("1"));
        dump.insert("c", text("y"));
        let planned = build_parameters(
            &dump,
            &[],
            &TagFilter::blacklist(["c"]),
            &NoiseFilter::default(),
        );
        let names: Vec<&str> = planned.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(planned[1].values, vec![ParameterValue::Numeric(1.0)]);
    }
}
