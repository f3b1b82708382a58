use crate::model::{Model, ProductId, UserId};
use serde::Serialize;

pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason { Personalized, PopularFallback }

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Personalized => "personalized", Self::PopularFallback => "popular_fallback" }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub products: Vec<ProductId>,
    pub reason: Reason,
}

/// Personalized list when the user has a non-empty one, otherwise the global
/// popularity list. Both are truncated to `limit`; short lists are returned as is.
pub fn recommend(model: &Model, user_id: UserId, limit: usize) -> Recommendation {
    match model.user_top_products.get(&user_id) {
        Some(list) if !list.is_empty() => Recommendation { products: head(list, limit), reason: Reason::Personalized },
        _ => Recommendation { products: head(&model.global_top_products, limit), reason: Reason::PopularFallback },
    }
}

fn head(list: &[ProductId], limit: usize) -> Vec<ProductId> { list.iter().take(limit).copied().collect() }
