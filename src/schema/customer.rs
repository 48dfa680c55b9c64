//! Customer-support schemas: the incoming user query and its analysis.
//!
//! [`user_input`] describes what a customer submits. [`customer_query`]
//! extends it with the fields the model is asked to infer. The typed
//! [`UserInput`] and [`CustomerQuery`] structs mirror the two schemas for
//! [`Record::parse_as`](crate::schema::Record::parse_as).

use super::{Field, Schema};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Allowed values of `customer_query.category`.
pub const CATEGORIES: [&str; 3] = ["refund_request", "information_request", "other"];

/// The base "user query" schema.
pub fn user_input() -> Schema {
    Schema::builder("user_input")
        .field(Field::string("name").example("Example User"))
        .field(Field::email("email").example("user@example.com"))
        .field(Field::string("query").example(
            "I ordered a new computer monitor and it arrived with the screen cracked. \
             I need to exchange it for a new one.",
        ))
        .field(
            Field::integer("order_id")
                .optional()
                .range(10000, 99999)
                .describe("5-digit order number (cannot start with 0)")
                .example(12345),
        )
        .field(Field::date("purchase_date").optional().example("2025-12-31"))
        .build()
        .expect("user_input declaration is consistent")
}

/// [`user_input`] plus the analysis fields.
pub fn customer_query() -> Schema {
    Schema::extend(&user_input(), "customer_query")
        .field(
            Field::string("priority")
                .describe("Priority level: low, medium, high")
                .example("medium"),
        )
        .field(
            Field::enumeration("category", &CATEGORIES)
                .describe("Query category")
                .example("refund_request"),
        )
        .field(
            Field::boolean("is_complaint")
                .describe("Whether this is a complaint")
                .example(true),
        )
        .field(
            Field::string_list("tags")
                .describe("Relevant keyword tags")
                .example(vec!["monitor", "support", "exchange"]),
        )
        .build()
        .expect("customer_query declaration is consistent")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    pub name: String,
    pub email: String,
    pub query: String,
    pub order_id: Option<u32>,
    pub purchase_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RefundRequest,
    InformationRequest,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerQuery {
    #[serde(flatten)]
    pub input: UserInput,
    pub priority: String,
    pub category: Category,
    pub is_complaint: bool,
    pub tags: Vec<String>,
}
