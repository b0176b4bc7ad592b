use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// The four document kinds driving (and driven by) stock movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Incoming,
    Outgoing,
    Transfer,
    Order,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Incoming => "incoming",
            DocType::Outgoing => "outgoing",
            DocType::Transfer => "transfer",
            DocType::Order => "order",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(DocType::Incoming),
            "outgoing" => Some(DocType::Outgoing),
            "transfer" => Some(DocType::Transfer),
            "order" => Some(DocType::Order),
            _ => None,
        }
    }

    /// Prefix for the sequential human-readable document number.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            DocType::Incoming => "INC",
            DocType::Outgoing => "OUT",
            DocType::Transfer => "TRF",
            DocType::Order => "ORD",
        }
    }
}

/// Union of all statuses across the four document type state machines.
/// Which statuses are reachable for a given type is defined by the
/// transition tables in `services::document_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Draft,
    Reserved,
    Shipped,
    InTransit,
    InTransitHub,
    InTransitDestination,
    Delivered,
    New,
    PartiallyFulfilled,
    Fulfilled,
    Completed,
    Canceled,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Draft => "draft",
            DocStatus::Reserved => "reserved",
            DocStatus::Shipped => "shipped",
            DocStatus::InTransit => "in_transit",
            DocStatus::InTransitHub => "in_transit_hub",
            DocStatus::InTransitDestination => "in_transit_destination",
            DocStatus::Delivered => "delivered",
            DocStatus::New => "new",
            DocStatus::PartiallyFulfilled => "partially_fulfilled",
            DocStatus::Fulfilled => "fulfilled",
            DocStatus::Completed => "completed",
            DocStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocStatus::Draft),
            "reserved" => Some(DocStatus::Reserved),
            "shipped" => Some(DocStatus::Shipped),
            "in_transit" => Some(DocStatus::InTransit),
            "in_transit_hub" => Some(DocStatus::InTransitHub),
            "in_transit_destination" => Some(DocStatus::InTransitDestination),
            "delivered" => Some(DocStatus::Delivered),
            "new" => Some(DocStatus::New),
            "partially_fulfilled" => Some(DocStatus::PartiallyFulfilled),
            "fulfilled" => Some(DocStatus::Fulfilled),
            "completed" => Some(DocStatus::Completed),
            "cancelled" | "canceled" => Some(DocStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocStatus::Completed | DocStatus::Canceled)
    }
}

/// Business document: the unit of intent behind every stock movement.
///
/// The table is flat; the per-type view of the variant columns is the
/// [`DocKind`] tagged union below.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[schema(as = Document)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub doc_num: String,
    pub order_num: Option<String>,
    pub doc_date: DateTime<Utc>,
    pub doc_type: String,
    pub doc_status: String,
    pub warehouse_id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub sum: rust_decimal::Decimal,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub from_warehouse_id: Option<Uuid>,
    pub to_warehouse_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((16, 6)))", nullable)]
    pub exchange_rate: Option<rust_decimal::Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub expenses: Option<rust_decimal::Decimal>,
    pub vendor_code: Option<String>,
    pub priority: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document_item::Entity")]
    DocumentItems,
}

impl Related<super::document_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DocumentItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Per-type view of a document, carrying only the fields that belong to
/// its variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "doc_type", rename_all = "snake_case")]
pub enum DocKind {
    Incoming {
        supplier_id: Uuid,
        exchange_rate: Option<rust_decimal::Decimal>,
        expenses: Option<rust_decimal::Decimal>,
        vendor_code: Option<String>,
    },
    Outgoing {
        customer_id: Uuid,
    },
    Transfer {
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
    },
    Order {
        customer_id: Uuid,
        priority: i32,
        expenses: Option<rust_decimal::Decimal>,
    },
}

impl DocKind {
    pub fn doc_type(&self) -> DocType {
        match self {
            DocKind::Incoming { .. } => DocType::Incoming,
            DocKind::Outgoing { .. } => DocType::Outgoing,
            DocKind::Transfer { .. } => DocType::Transfer,
            DocKind::Order { .. } => DocType::Order,
        }
    }
}

impl Model {
    pub fn doc_type(&self) -> Result<DocType, ServiceError> {
        DocType::parse(&self.doc_type).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "document {} has unknown type '{}'",
                self.id, self.doc_type
            ))
        })
    }

    pub fn status(&self) -> Result<DocStatus, ServiceError> {
        DocStatus::parse(&self.doc_status).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "document {} has unknown status '{}'",
                self.id, self.doc_status
            ))
        })
    }

    /// Reconstructs the tagged variant view from the flat row.
    pub fn kind(&self) -> Result<DocKind, ServiceError> {
        let missing = |field: &str| {
            ServiceError::InternalError(format!(
                "document {} of type '{}' is missing {}",
                self.id, self.doc_type, field
            ))
        };
        match self.doc_type()? {
            DocType::Incoming => Ok(DocKind::Incoming {
                supplier_id: self.supplier_id.ok_or_else(|| missing("supplier_id"))?,
                exchange_rate: self.exchange_rate,
                expenses: self.expenses,
                vendor_code: self.vendor_code.clone(),
            }),
            DocType::Outgoing => Ok(DocKind::Outgoing {
                customer_id: self.customer_id.ok_or_else(|| missing("customer_id"))?,
            }),
            DocType::Transfer => Ok(DocKind::Transfer {
                from_warehouse_id: self
                    .from_warehouse_id
                    .ok_or_else(|| missing("from_warehouse_id"))?,
                to_warehouse_id: self
                    .to_warehouse_id
                    .ok_or_else(|| missing("to_warehouse_id"))?,
            }),
            DocType::Order => Ok(DocKind::Order {
                customer_id: self.customer_id.ok_or_else(|| missing("customer_id"))?,
                priority: self.priority.unwrap_or(0),
                expenses: self.expenses,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_round_trip() {
        for status in [
            DocStatus::Draft,
            DocStatus::Reserved,
            DocStatus::Shipped,
            DocStatus::InTransit,
            DocStatus::InTransitHub,
            DocStatus::InTransitDestination,
            DocStatus::Delivered,
            DocStatus::New,
            DocStatus::PartiallyFulfilled,
            DocStatus::Fulfilled,
            DocStatus::Completed,
            DocStatus::Canceled,
        ] {
            assert_eq!(DocStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocStatus::parse("cancelled"), Some(DocStatus::Canceled));
        assert_eq!(DocStatus::parse("bogus"), None);
    }

    #[test]
    fn doc_type_prefixes_are_distinct() {
        let prefixes = [
            DocType::Incoming.number_prefix(),
            DocType::Outgoing.number_prefix(),
            DocType::Transfer.number_prefix(),
            DocType::Order.number_prefix(),
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
