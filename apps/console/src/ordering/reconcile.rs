use crate::models::block::Block;

use super::canonical::CanonicalOrder;

impl CanonicalOrder {
    /// Reorders blocks by category rank.
    ///
    /// The sort is stable: blocks with equal rank, including every unmatched
    /// block, keep their relative input order. Ids and include flags are not
    /// touched, so applying this twice gives the same result as once.
    pub fn reconcile(&self, blocks: &[Block]) -> Vec<Block> {
        let mut ranked: Vec<(usize, &Block)> = blocks
            .iter()
            .map(|block| (self.rank(&block.name), block))
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, block)| block.clone()).collect()
    }
}

/// Reorders blocks with the built-in consolidated order.
pub fn apply_default_order(blocks: &[Block]) -> Vec<Block> {
    CanonicalOrder::default_order().reconcile(blocks)
}
