use serde::Serialize;
use serde_json::Value as JsonValue;

use super::models::{
    CollectionSelector, CompositeFilter, CompositeOperator, Direction, FieldFilter,
    FieldOperator, FieldReference, Order, QueryFilter, StructuredQuery, UnaryFilter,
    UnaryOperator,
};
use super::value::encode_value;
use super::FirestoreError;

/// Accumulated query constraints for one collection.
///
/// Constraint methods consume and return the builder; the immutability the
/// public handles guarantee comes from [`CollectionReference`] cloning its
/// `Query` before delegating here.
///
/// [`CollectionReference`]: super::reference::CollectionReference
#[derive(Clone, Debug)]
pub struct Query {
    pub(crate) collection_id: String,
    pub(crate) structured: StructuredQuery,
}

impl Query {
    pub fn new(collection_id: impl Into<String>) -> Self {
        let collection_id = collection_id.into();
        Self {
            collection_id: collection_id.clone(),
            structured: StructuredQuery {
                from: Some(vec![CollectionSelector {
                    collection_id,
                    all_descendants: None,
                }]),
                where_clause: None,
                order_by: None,
                limit: None,
            },
        }
    }

    /// Appends a filter. Filters compound with AND semantics: an existing
    /// AND composite grows by one member, anything else becomes the first
    /// member of a new composite. Prior filters are never discarded.
    pub fn where_filter<T: Serialize>(
        mut self,
        field: &str,
        op: FieldOperator,
        value: T,
    ) -> Result<Self, FirestoreError> {
        let json = serde_json::to_value(value)?;
        let filter = build_filter(field, op, json)?;

        self.structured.where_clause = Some(match self.structured.where_clause.take() {
            None => filter,
            Some(QueryFilter::CompositeFilter(mut composite))
                if composite.op == CompositeOperator::And =>
            {
                composite.filters.push(filter);
                QueryFilter::CompositeFilter(composite)
            }
            Some(existing) => QueryFilter::CompositeFilter(CompositeFilter {
                op: CompositeOperator::And,
                filters: vec![existing, filter],
            }),
        });

        Ok(self)
    }

    /// Appends a sort key.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        let order = Order {
            field: FieldReference {
                field_path: field.to_string(),
            },
            direction,
        };

        match &mut self.structured.order_by {
            Some(order_by) => order_by.push(order),
            None => self.structured.order_by = Some(vec![order]),
        }

        self
    }

    /// Caps the number of documents returned.
    pub fn limit(mut self, limit: i32) -> Self {
        self.structured.limit = Some(limit);
        self
    }
}

fn build_filter(
    field: &str,
    op: FieldOperator,
    value: JsonValue,
) -> Result<QueryFilter, FirestoreError> {
    let field = FieldReference {
        field_path: field.to_string(),
    };

    // The store does not accept null as a field-filter operand; null
    // comparisons are expressed as unary filters.
    if value.is_null() {
        let op = match op {
            FieldOperator::Equal => UnaryOperator::IsNull,
            FieldOperator::NotEqual => UnaryOperator::IsNotNull,
            other => {
                return Err(FirestoreError::Validation(format!(
                    "null can only be compared with == or !=, got {:?}",
                    other
                )))
            }
        };
        return Ok(QueryFilter::UnaryFilter(UnaryFilter { op, field }));
    }

    Ok(QueryFilter::FieldFilter(FieldFilter {
        field,
        op,
        value: encode_value(value)?,
    }))
}
