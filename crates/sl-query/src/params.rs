use sl_schemas::ApiError;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    Gt,
    Lt,
    Neq,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Neq => "<>",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "gte" => Some(FilterOp::Gte),
            "lte" => Some(FilterOp::Lte),
            "gt" => Some(FilterOp::Gt),
            "lt" => Some(FilterOp::Lt),
            "neq" => Some(FilterOp::Neq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub filters: Vec<ColumnFilter>,
    pub sort: Option<String>,
    pub descending: bool,
    pub limit: i64,
    pub offset: i64,
    pub fields: Option<Vec<String>>,
}

/// Parse raw query parameters into a spec. Column *existence* is checked
/// later against the view definition; this stage handles the reserved keys
/// and the limit/offset clamps.
pub fn parse_query(params: &[(String, String)]) -> Result<QuerySpec, ApiError> {
    let mut spec = QuerySpec {
        filters: Vec::new(),
        sort: None,
        descending: false,
        limit: DEFAULT_LIMIT,
        offset: 0,
        fields: None,
    };

    for (key, value) in params {
        match key.as_str() {
            "_sort" => spec.sort = Some(value.clone()),
            "_order" => match value.as_str() {
                "asc" => spec.descending = false,
                "desc" => spec.descending = true,
                other => {
                    return Err(ApiError::validation(format!(
                        "_order must be asc or desc, got {other}"
                    )))
                }
            },
            "_limit" => {
                let raw: i64 = value
                    .parse()
                    .map_err(|_| ApiError::validation(format!("invalid _limit: {value}")))?;
                spec.limit = clamp_limit(raw);
            }
            "_offset" => {
                let raw: i64 = value
                    .parse()
                    .map_err(|_| ApiError::validation(format!("invalid _offset: {value}")))?;
                spec.offset = raw.max(0);
            }
            "_fields" => {
                let fields: Vec<String> = value
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect();
                if fields.is_empty() {
                    return Err(ApiError::validation("_fields must name at least one column"));
                }
                spec.fields = Some(fields);
            }
            other => {
                let (column, op) = match other.rsplit_once('.') {
                    Some((col, suffix)) => match FilterOp::parse(suffix) {
                        Some(op) => (col.to_string(), op),
                        // Not an operator suffix: the whole key is a column
                        // name and will fail identifier validation later.
                        None => (other.to_string(), FilterOp::Eq),
                    },
                    None => (other.to_string(), FilterOp::Eq),
                };
                spec.filters.push(ColumnFilter {
                    column,
                    op,
                    value: value.clone(),
                });
            }
        }
    }

    Ok(spec)
}

/// `0` falls back to the default page size, negatives clamp to 1, and the
/// ceiling is 1000.
pub fn clamp_limit(raw: i64) -> i64 {
    if raw == 0 {
        DEFAULT_LIMIT
    } else if raw < 0 {
        1
    } else {
        raw.min(MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_with_no_params() {
        let spec = parse_query(&[]).unwrap();
        assert_eq!(spec.limit, DEFAULT_LIMIT);
        assert_eq!(spec.offset, 0);
        assert!(spec.sort.is_none());
        assert!(!spec.descending);
        assert!(spec.filters.is_empty());
    }

    #[test]
    fn limit_clamps_match_the_contract() {
        assert_eq!(parse_query(&pairs(&[("_limit", "5000")])).unwrap().limit, 1000);
        assert_eq!(parse_query(&pairs(&[("_limit", "-1")])).unwrap().limit, 1);
        assert_eq!(parse_query(&pairs(&[("_limit", "0")])).unwrap().limit, 50);
        assert_eq!(parse_query(&pairs(&[("_limit", "25")])).unwrap().limit, 25);
    }

    #[test]
    fn op_suffixes_parse_and_unknown_suffixes_stay_in_the_column() {
        let spec = parse_query(&pairs(&[("price.gte", "100"), ("seller", "SP1AAA")])).unwrap();
        assert_eq!(
            spec.filters[0],
            ColumnFilter {
                column: "price".to_string(),
                op: FilterOp::Gte,
                value: "100".to_string()
            }
        );
        assert_eq!(spec.filters[1].op, FilterOp::Eq);

        // "price.evil" is not an operator: treated as a (bogus) column name
        // that identifier validation rejects downstream.
        let spec = parse_query(&pairs(&[("price.evil", "1")])).unwrap();
        assert_eq!(spec.filters[0].column, "price.evil");
    }

    #[test]
    fn order_validation() {
        assert!(parse_query(&pairs(&[("_order", "desc")])).unwrap().descending);
        assert!(!parse_query(&pairs(&[("_order", "asc")])).unwrap().descending);
        let err = parse_query(&pairs(&[("_order", "sideways")])).unwrap_err();
        assert_eq!(err.code, sl_schemas::ErrorCode::ValidationError);
    }

    #[test]
    fn bad_numbers_are_validation_errors() {
        assert!(parse_query(&pairs(&[("_limit", "abc")])).is_err());
        assert!(parse_query(&pairs(&[("_offset", "abc")])).is_err());
        assert_eq!(parse_query(&pairs(&[("_offset", "-5")])).unwrap().offset, 0);
    }
}
