pub mod catalog;
pub mod quote;

pub use catalog::{lookup_item, CatalogItem, WEIGHTED_BLANKET_CODE};
pub use quote::{calculate, PricingType, Quote, QuoteInput, QuoteItemInput, QuoteLineItem};
