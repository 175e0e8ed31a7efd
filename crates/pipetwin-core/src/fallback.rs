//! # Fallback Chains
//!
//! An ordered list of named tiers. Each tier produces candidate items from a
//! shared context; the first tier that yields a non-empty list wins and the
//! remaining tiers are never evaluated. A tier error aborts the chain.
//!
//! Drilldown uses chains for linked buildings, rooms, valves and equipment,
//! so each answer carries the name of the tier that produced it.

use crate::TwinError;

/// A tier: produce items from the context, or an empty list to fall through.
pub type Tier<C, T> = fn(&C) -> Result<Vec<T>, TwinError>;

/// Outcome of a chain: the winning tier (if any) and its items.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub tier: Option<&'static str>,
    pub items: Vec<T>,
}

/// An explicit, ordered list of tiers.
pub struct FallbackChain<C, T> {
    name: &'static str,
    tiers: Vec<(&'static str, Tier<C, T>)>,
}

impl<C, T> FallbackChain<C, T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tiers: Vec::new(),
        }
    }

    /// Append a tier after every tier added so far.
    #[must_use]
    pub fn tier(mut self, name: &'static str, tier: Tier<C, T>) -> Self {
        self.tiers.push((name, tier));
        self
    }

    /// Tier names in evaluation order.
    pub fn tier_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tiers.iter().map(|(name, _)| *name)
    }

    /// Evaluate tiers in order and stop at the first non-empty one.
    pub fn resolve(&self, ctx: &C) -> Result<Resolved<T>, TwinError> {
        for &(tier_name, tier) in &self.tiers {
            let items = tier(ctx)?;
            if !items.is_empty() {
                tracing::debug!(
                    chain = self.name,
                    tier = tier_name,
                    count = items.len(),
                    "fallback tier resolved"
                );
                return Ok(Resolved {
                    tier: Some(tier_name),
                    items,
                });
            }
        }
        tracing::debug!(chain = self.name, "every fallback tier was empty");
        Ok(Resolved {
            tier: None,
            items: Vec::new(),
        })
    }
}
