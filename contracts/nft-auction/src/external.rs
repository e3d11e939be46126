use commons::{ContractTokenId, Token};
use concordium_std::*;

/// Parameter for the `list` entrypoint.
#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct ListParams {
    /// NFT to put up for auction.
    pub token: Token,
    /// Smallest acceptable bid.
    pub min_price: Amount,
    /// Auction duration in hours from the time of listing.
    pub duration_hours: u32,
}

/// Return value of the `view` entrypoint: the listing fields a client
/// needs to render an auction.
#[derive(Debug, Serialize, SchemaType, PartialEq, Eq)]
pub struct ListingView {
    /// NFT contract address.
    pub contract: ContractAddress,
    /// NFT token identifier.
    pub id: ContractTokenId,
    /// Current highest bid. Zero until the first bid is accepted.
    pub highest_bid: Amount,
    /// Smallest acceptable bid.
    pub min_price: Amount,
    /// Time after which bidding is closed and settlement is allowed.
    pub end_time: Timestamp,
}
