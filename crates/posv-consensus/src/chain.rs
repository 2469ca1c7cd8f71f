//! Chain reader capability.

use posv_primitives::{Block, ChainConfig, Header, B256};

/// Read access to the header chain, supplied by the node wiring layer.
///
/// The engine never writes through this trait; snapshot persistence goes
/// through its own storage handle.
pub trait ChainReader: Send + Sync {
    /// Chain configuration, including epoch geometry.
    fn config(&self) -> &ChainConfig;

    /// Header by hash and number.
    fn header(&self, hash: &B256, number: u64) -> Option<Header>;

    /// Canonical header by number.
    fn header_by_number(&self, number: u64) -> Option<Header>;

    /// Current chain head.
    fn current_header(&self) -> Option<Header>;

    /// Full block by hash and number, when the body is available.
    fn block(&self, hash: &B256, number: u64) -> Option<Block> {
        let _ = (hash, number);
        None
    }
}
