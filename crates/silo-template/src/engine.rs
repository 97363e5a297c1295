//! Placeholder parsing, explosion and recursive resolution.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use itertools::Itertools;

use crate::dates::{derive_sibling_keys, handle_date_field};
use crate::value::{VarMap, VarValue};
use crate::{Result, TemplateError};

// ---------------------------------------------------------------------------
// Placeholder parsing
// ---------------------------------------------------------------------------

/// The set of `{name}` placeholders a template references.
///
/// Doubled braces are literals and reference nothing.
pub fn keys_of_template(template: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    name.push(c);
                }
                // Strip any conversion/format spec; only the field name binds.
                let name = name.split([':', '!']).next().unwrap_or_default();
                if !name.is_empty() {
                    keys.insert(name.to_string());
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            _ => {}
        }
    }
    keys
}

/// Substitutes every `{name}` in `template` from `vars`.
///
/// Doubled braces render as single literal braces. A placeholder with no
/// binding is an error.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBraces);
                }
                let name = name.split([':', '!']).next().unwrap_or_default();
                let value = vars.get(name).ok_or_else(|| TemplateError::MissingVar {
                    name: name.to_string(),
                })?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Explosion
// ---------------------------------------------------------------------------

/// Explodes a variables object into one concrete mapping per combination of
/// its list values.
///
/// Date-macro keys are expanded against `now` first (an int offset becomes
/// a single-element list, a `[lo, hi]` pair the full range). The
/// cross-product walks keys in sorted order and list elements in file
/// order, so the output order is deterministic.
pub fn explode(vars: &VarMap, now: NaiveDateTime) -> Result<Vec<BTreeMap<String, String>>> {
    // A mapping with no keys still yields one (empty) combination.
    if vars.is_empty() {
        return Ok(vec![BTreeMap::new()]);
    }

    let mut per_key: Vec<(String, Vec<String>)> = Vec::with_capacity(vars.len());
    for (key, value) in vars {
        let rendered = match handle_date_field(now, key, value)? {
            Some(dates) => dates,
            None => match value {
                VarValue::Str(s) => vec![s.clone()],
                VarValue::Int(n) => vec![n.to_string()],
                VarValue::List(items) => items.iter().map(|s| s.render()).collect(),
            },
        };
        per_key.push((key.clone(), rendered));
    }

    let combos = per_key
        .iter()
        .map(|(_, choices)| choices.iter())
        .multi_cartesian_product();

    let mut out = Vec::new();
    for combo in combos {
        let map = per_key
            .iter()
            .zip(combo)
            .map(|((key, _), value)| (key.clone(), value.clone()))
            .collect();
        out.push(map);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Recursive resolution
// ---------------------------------------------------------------------------

/// Resolves every templated value in `vars` against the other values,
/// repeatedly, until none remain.
///
/// Sibling date keys are injected first so they are available as
/// substitution sources. A pass that makes no progress means the mapping
/// references itself (or a key that does not exist) and is fatal. After
/// resolution, keys ending in `_dash2uscore` have `-` mapped to `_` in
/// their values.
pub fn eval_tmpl_recurse(vars: BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
    let mut resolved = vars;
    derive_sibling_keys(&mut resolved)?;

    let mut pending: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut usable: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in &resolved {
        let needed = keys_of_template(value);
        if needed.is_empty() {
            usable.insert(key.clone(), value.clone());
        } else {
            pending.insert(key.clone(), needed);
        }
    }

    while !pending.is_empty() {
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, needed)| needed.iter().all(|n| usable.contains_key(n)))
            .map(|(k, _)| k.clone())
            .collect();
        if ready.is_empty() {
            return Err(TemplateError::CircularReference {
                vars: format!("{resolved:?}"),
            });
        }
        for key in ready {
            let value = render(&resolved[&key], &usable)?;
            resolved.insert(key.clone(), value.clone());
            usable.insert(key.clone(), value);
            pending.remove(&key);
        }
    }

    for (key, value) in resolved.iter_mut() {
        if key.ends_with("_dash2uscore") {
            *value = value.replace('-', "_");
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    fn strmap(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn keys_of_template_basic() {
        assert_eq!(
            keys_of_template("{a}_{b}"),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert!(keys_of_template("ab.foo").is_empty());
        assert!(keys_of_template("{{literal}}").is_empty());
    }

    #[test]
    fn render_substitutes_and_unescapes() {
        let vars = strmap(&[("a", "x")]);
        assert_eq!(render("pre {a} post", &vars).unwrap(), "pre x post");
        assert_eq!(render("{{a}} {a}", &vars).unwrap(), "{a} x");
        assert!(matches!(
            render("{missing}", &vars),
            Err(TemplateError::MissingVar { .. })
        ));
    }

    #[test]
    fn eval_recurse_simple() {
        let result = eval_tmpl_recurse(strmap(&[("a", "{b}"), ("b", "c")])).unwrap();
        assert_eq!(result, strmap(&[("a", "c"), ("b", "c")]));
    }

    #[test]
    fn eval_recurse_two_levels() {
        let result = eval_tmpl_recurse(strmap(&[("a", "{b}"), ("b", "{c}"), ("c", "d")])).unwrap();
        assert_eq!(result, strmap(&[("a", "d"), ("b", "d"), ("c", "d")]));
    }

    #[test]
    fn eval_recurse_compound_values() {
        let result =
            eval_tmpl_recurse(strmap(&[("a", "{c}_{e}"), ("b", "{c}"), ("c", "d"), ("e", "f")]))
                .unwrap();
        assert_eq!(
            result,
            strmap(&[("a", "d_f"), ("b", "d"), ("c", "d"), ("e", "f")])
        );
    }

    #[test]
    fn eval_recurse_circular_is_fatal() {
        let err = eval_tmpl_recurse(strmap(&[("a", "{b}"), ("b", "{a}")])).unwrap_err();
        assert!(matches!(err, TemplateError::CircularReference { .. }));
    }

    #[test]
    fn eval_recurse_is_identity_on_concrete_maps() {
        let input = strmap(&[("table", "events"), ("threshold", "0.2")]);
        assert_eq!(eval_tmpl_recurse(input.clone()).unwrap(), input);
    }

    #[test]
    fn eval_recurse_applies_dash2uscore() {
        let result =
            eval_tmpl_recurse(strmap(&[("t_dash2uscore", "{n}-x"), ("n", "a-b")])).unwrap();
        assert_eq!(result["t_dash2uscore"], "a_b_x");
    }

    #[test]
    fn explode_without_lists_is_identity() {
        let vars = VarMap::from([
            ("table".to_string(), VarValue::from("{filename}_x")),
            ("threshold".to_string(), VarValue::from("0.2")),
        ]);
        let out = explode(&vars, now()).unwrap();
        assert_eq!(
            out,
            vec![strmap(&[("table", "{filename}_x"), ("threshold", "0.2")])]
        );
    }

    #[test]
    fn explode_one_list() {
        let vars = VarMap::from([(
            "kw".to_string(),
            VarValue::List(vec![
                crate::Scalar::Str("url_kw".into()),
                crate::Scalar::Str("url_kw_title".into()),
            ]),
        )]);
        let out = explode(&vars, now()).unwrap();
        assert_eq!(
            out,
            vec![strmap(&[("kw", "url_kw")]), strmap(&[("kw", "url_kw_title")])]
        );
    }

    #[test]
    fn explode_cross_product_is_order_insensitive() {
        let a = VarMap::from([
            (
                "x".to_string(),
                VarValue::List(vec![crate::Scalar::Str("1".into()), crate::Scalar::Str("2".into())]),
            ),
            (
                "y".to_string(),
                VarValue::List(vec![crate::Scalar::Str("a".into()), crate::Scalar::Str("b".into())]),
            ),
        ]);
        // Same mapping built in the opposite insertion order.
        let b: VarMap = a.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();

        let out_a: BTreeSet<_> = explode(&a, now()).unwrap().into_iter().collect();
        let out_b: BTreeSet<_> = explode(&b, now()).unwrap().into_iter().collect();
        assert_eq!(out_a, out_b);
        assert_eq!(out_a.len(), 4);
    }

    #[test]
    fn explode_expands_date_keys_then_template_references_them() {
        let vars = VarMap::from([
            (
                "yyyymmdd".to_string(),
                VarValue::List(vec![crate::Scalar::Int(-1), crate::Scalar::Int(0)]),
            ),
            ("t".to_string(), VarValue::from("t_{yyyymmdd}")),
        ]);
        let out = explode(&vars, now()).unwrap();
        assert_eq!(out.len(), 2);

        let yesterday = (now() - Duration::days(1)).format("%Y%m%d").to_string();
        let today = now().format("%Y%m%d").to_string();

        let resolved: Vec<_> = out.into_iter().map(|m| eval_tmpl_recurse(m).unwrap()).collect();
        let tables: BTreeSet<_> = resolved.iter().map(|m| m["t"].clone()).collect();
        assert_eq!(
            tables,
            BTreeSet::from([format!("t_{yesterday}"), format!("t_{today}")])
        );
    }

    #[test]
    fn explode_then_eval_matches_full_pipeline_expectations() {
        // Mirrors the original keyword-table expansion: 2 x 3 x 4 lists plus
        // a date offset produce 24 distinct table names.
        let vars = VarMap::from([
            ("filename".to_string(), VarValue::from("myfile")),
            (
                "table".to_string(),
                VarValue::from("{filename}_{keywords_table}_{kw}_{yyyymmdd}_{modulo_val}"),
            ),
            ("keywords_table".to_string(), VarValue::from("{kw_features_table}")),
            (
                "kw_features_table".to_string(),
                VarValue::List(vec![
                    crate::Scalar::Str("kw_features_ranked".into()),
                    crate::Scalar::Str("kw_expansion_ranked".into()),
                ]),
            ),
            ("yyyymmdd".to_string(), VarValue::Int(-1)),
            (
                "kw".to_string(),
                VarValue::List(vec![
                    crate::Scalar::Str("url_kw".into()),
                    crate::Scalar::Str("url_title_tokens_kw".into()),
                    crate::Scalar::Str("url_url_tokens_kw".into()),
                ]),
            ),
            (
                "modulo_val".to_string(),
                VarValue::List(vec![
                    crate::Scalar::Str("0".into()),
                    crate::Scalar::Str("1".into()),
                    crate::Scalar::Str("2".into()),
                    crate::Scalar::Str("3".into()),
                ]),
            ),
            ("modulo".to_string(), VarValue::from("4")),
        ]);

        let exploded = explode(&vars, now()).unwrap();
        assert_eq!(exploded.len(), 24);

        let dt = (now() - Duration::days(1)).format("%Y%m%d").to_string();
        let tables: BTreeSet<String> = exploded
            .into_iter()
            .map(|m| eval_tmpl_recurse(m).unwrap()["table"].clone())
            .collect();
        assert_eq!(tables.len(), 24);
        assert!(tables.contains(&format!("myfile_kw_features_ranked_url_kw_{dt}_0")));
        assert!(tables.contains(&format!("myfile_kw_expansion_ranked_url_url_tokens_kw_{dt}_3")));
    }
}
