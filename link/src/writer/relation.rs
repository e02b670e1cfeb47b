use crate::writer::operators::eq;
use crate::writer::value::{json_string, thing, Raw};
use crate::writer::Where;

/// An edge between two records, used to target a relation without trusting
/// caller-supplied record ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRelation {
    /// When set, `from_id` is interpreted inside this table.
    pub from_table: Option<String>,
    pub from_id: String,
    pub edge: String,
    pub to_table: Option<String>,
    pub to_id: String,
}

impl RecordRelation {
    pub fn new(
        from_table: impl Into<String>,
        from_id: impl Into<String>,
        edge: impl Into<String>,
        to_table: impl Into<String>,
        to_id: impl Into<String>,
    ) -> Self {
        Self {
            from_table: Some(from_table.into()),
            from_id: from_id.into(),
            edge: edge.into(),
            to_table: Some(to_table.into()),
            to_id: to_id.into(),
        }
    }

    pub(crate) fn from_pointer(&self) -> Raw {
        pointer(self.from_table.as_deref(), &self.from_id)
    }

    pub(crate) fn to_pointer(&self) -> Raw {
        pointer(self.to_table.as_deref(), &self.to_id)
    }

    /// `in = <from> AND out = <to>`
    pub(crate) fn where_clause(&self) -> Where {
        Where::new()
            .field("in", eq(self.from_pointer()))
            .field("out", eq(self.to_pointer()))
    }
}

fn pointer(table: Option<&str>, id: &str) -> Raw {
    match table {
        Some(table) => thing(table, id),
        None => Raw::new(json_string(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_where_clause() {
        let rel = RecordRelation::new("person", "tobie", "likes", "post", "1");
        assert_eq!(
            rel.where_clause().compile().unwrap(),
            r#"in = type::thing("person", "tobie") AND out = type::thing("post", "1")"#
        );
    }

    #[test]
    fn test_untabled_ids_are_quoted() {
        let rel = RecordRelation {
            from_table: None,
            from_id: "person:tobie".into(),
            edge: "likes".into(),
            to_table: None,
            to_id: "post:1".into(),
        };
        assert_eq!(rel.from_pointer().render().unwrap(), r#""person:tobie""#);
    }
}
