//! Reserved word and built-in function classification
//!
//! Anything recognized here is never extracted, never given a placeholder and
//! never substituted, even when a stale mapping says otherwise. Keywords come
//! from `sqlparser`; built-in functions are listed here because the parser
//! treats them as ordinary words.

use sqlparser::keywords::ALL_KEYWORDS;
use std::collections::HashSet;
use std::sync::LazyLock;

// Words sqlparser knows as keywords in some dialect that schemas use as plain
// column and table names. They stay maskable.
const NAME_KEYWORDS: &[&str] = &[
    "id", "name", "status", "state", "type", "value", "data", "event", "events", "email",
    "amount", "total", "balance", "price", "cost", "note", "notes", "region", "segment",
    "owner", "source", "target", "label", "code", "comment", "description", "title",
    "payload", "priority", "category", "version", "location", "path", "url", "size", "role",
    "account", "password", "content", "message", "scope", "action",
];

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "array_agg", "string_agg", "group_concat",
    "listagg", "bool_and", "bool_or", "every", "approx_count_distinct", "any_value",
];

const STRING_FUNCTIONS: &[&str] = &[
    "upper", "lower", "trim", "ltrim", "rtrim", "btrim", "substring", "substr", "length",
    "len", "char_length", "character_length", "octet_length", "concat", "concat_ws",
    "coalesce", "isnull", "ifnull", "nvl", "nvl2", "nullif", "cast", "try_cast", "convert",
    "lpad", "rpad", "position", "strpos", "instr", "locate", "reverse", "split_part",
    "initcap", "format", "regexp_replace", "regexp_like", "regexp_substr", "regexp_extract",
    "md5", "sha1", "sha2", "ascii", "chr", "lcase", "ucase", "translate", "quote_ident",
    "quote_literal", "left", "right", "repeat", "iif", "decode", "greatest", "least",
];

const DATE_FUNCTIONS: &[&str] = &[
    "now", "current_timestamp", "current_date", "current_time", "getdate", "getutcdate",
    "sysdate", "systimestamp", "datepart", "datediff", "dateadd", "datename", "date_trunc",
    "date_part", "date_add", "date_sub", "date_diff", "date_format", "to_date", "to_char",
    "to_timestamp", "to_number", "extract", "last_day", "add_months", "months_between",
    "unix_timestamp", "from_unixtime", "localtime", "localtimestamp", "age", "eomonth",
    "dayofweek", "dayofmonth", "dayofyear", "weekday", "week", "quarter",
];

const NUMERIC_FUNCTIONS: &[&str] = &[
    "abs", "ceil", "ceiling", "floor", "round", "trunc", "mod", "power", "pow", "sqrt",
    "exp", "ln", "log", "log10", "log2", "sign", "random", "rand", "pi", "div",
];

const STATISTICAL_FUNCTIONS: &[&str] = &[
    "stddev", "stddev_pop", "stddev_samp", "variance", "var_pop", "var_samp", "median",
    "mode", "percentile_cont", "percentile_disc", "corr", "covar_pop", "covar_samp",
    "regr_slope", "regr_intercept", "row_number", "rank", "dense_rank", "ntile", "lead",
    "lag", "first_value", "last_value", "nth_value", "percent_rank", "cume_dist",
];

const JSON_FUNCTIONS: &[&str] = &[
    "json_extract", "json_value", "json_query", "json_object", "json_array", "json_agg",
    "jsonb_agg", "json_build_object", "jsonb_build_object", "json_extract_path",
    "json_extract_path_text", "to_json", "to_jsonb", "json_each", "jsonb_each",
    "json_array_length", "jsonb_array_elements", "json_array_elements", "parse_json",
    "json_table", "json_contains", "json_keys", "generate_series", "unnest",
];

static BUILTIN_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        AGGREGATE_FUNCTIONS,
        STRING_FUNCTIONS,
        DATE_FUNCTIONS,
        NUMERIC_FUNCTIONS,
        STATISTICAL_FUNCTIONS,
        JSON_FUNCTIONS,
    ]
    .into_iter()
    .flatten()
    .copied()
    .collect()
});

/// True for sqlparser keywords, ignoring case, minus [`NAME_KEYWORDS`].
pub fn is_keyword(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    ALL_KEYWORDS.binary_search(&upper.as_str()).is_ok()
        && !NAME_KEYWORDS.contains(&token.to_ascii_lowercase().as_str())
}

pub fn is_builtin_function(token: &str) -> bool {
    BUILTIN_FUNCTIONS.contains(token.to_ascii_lowercase().as_str())
}

/// True when `token` must never be masked.
pub fn is_reserved_or_builtin(token: &str) -> bool {
    is_keyword(token) || is_builtin_function(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_keywords_case_insensitive() {
        for kw in ["SELECT", "select", "SeLeCt", "FROM", "where", "Group", "BY"] {
            assert!(is_reserved_or_builtin(kw), "{} should be reserved", kw);
        }
    }

    #[test]
    fn test_data_types_and_window_vocabulary() {
        for kw in ["VARCHAR", "timestamp", "OVER", "partition", "unbounded", "preceding"] {
            assert!(is_keyword(kw), "{} should be a keyword", kw);
        }
    }

    #[test]
    fn test_builtin_functions() {
        for func in ["COUNT", "coalesce", "DATE_TRUNC", "json_extract", "stddev", "row_number"] {
            assert!(is_builtin_function(func), "{} should be builtin", func);
            assert!(is_reserved_or_builtin(func));
        }
    }

    #[test]
    fn test_user_identifiers_are_not_reserved() {
        for name in ["customers", "email", "order_total", "calc_margin", "analytics", "id"] {
            assert!(!is_reserved_or_builtin(name), "{} should not be reserved", name);
        }
    }

    #[test]
    fn test_name_like_keywords_stay_maskable() {
        for name in ["status", "NAME", "Amount", "region", "event"] {
            assert!(!is_keyword(name), "{} should be maskable", name);
        }
        assert!(is_keyword("KEY"));
        assert!(is_keyword("level"));
    }

    #[test]
    fn test_functions_that_are_also_keywords() {
        assert!(is_builtin_function("count"));
        assert!(is_keyword("left"));
        assert!(is_builtin_function("left"));
        assert!(!is_builtin_function("select"));
    }

    #[test]
    fn test_word_lists_are_lowercase() {
        for word in NAME_KEYWORDS.iter().chain(BUILTIN_FUNCTIONS.iter()) {
            assert_eq!(*word, word.to_ascii_lowercase());
        }
    }
}
