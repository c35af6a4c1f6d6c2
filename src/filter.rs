// Equality filters over indexed record fields

/// Match records whose indexed `field` equals `value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.field, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_filter() {
        let filter = Filter::eq("column_id", "todo");
        assert_eq!(filter.field, "column_id");
        assert_eq!(filter.value, "todo");
        assert_eq!(filter.to_string(), "column_id = todo");
    }
}
