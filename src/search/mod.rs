//! Search - vendor universal-search client and response flattening

pub mod card;
pub mod client;
pub mod response;

pub use card::{render_entity_card, DEFAULT_CHAR_LIMIT, ELLIPSIS};
pub use client::{HttpSearchClient, SearchClient};
pub use response::{
    extract_field_names, extract_link_field_names, flatten_response, redact_business_id, union_fields,
    EntityResult, SearchVerticalResponse, LINKS_VERTICAL,
};
