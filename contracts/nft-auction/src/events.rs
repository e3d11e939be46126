use commons::{ContractTokenId, ListingId, BIDING_TAG, LISTING_TAG};
use concordium_std::*;

/// Listing creation event data.
#[derive(Debug, Serial)]
pub struct ListEvent<'a> {
    /// Account that listed the token.
    pub lister: &'a AccountAddress,
    /// NFT contract address.
    pub contract: &'a ContractAddress,
    /// NFT token identifier.
    pub id: &'a ContractTokenId,
    /// Identifier assigned to the listing.
    pub listing_id: ListingId,
    /// Smallest acceptable bid.
    pub min_price: Amount,
    /// Time after which bidding is closed.
    pub end_time: Timestamp,
    /// Time the listing was created.
    pub timestamp: Timestamp,
}

/// Bid event data.
#[derive(Debug, Serial)]
pub struct BidEvent<'a> {
    /// Bidder account address.
    pub bidder: &'a AccountAddress,
    /// Listing the bid was placed on.
    pub listing_id: ListingId,
    /// Bid amount.
    pub amount: Amount,
    /// Time the bid was accepted.
    pub timestamp: Timestamp,
}

/// Tagged Custom event to be serialized for the event log.
#[derive(Debug)]
pub enum AuctionEvent<'a> {
    /// List NFT
    List(ListEvent<'a>),
    /// Bid on a listing
    Bid(BidEvent<'a>),
}

impl<'a> AuctionEvent<'a> {
    pub fn list(
        lister: &'a AccountAddress,
        contract: &'a ContractAddress,
        id: &'a ContractTokenId,
        listing_id: ListingId,
        min_price: Amount,
        end_time: Timestamp,
        timestamp: Timestamp,
    ) -> Self {
        Self::List(ListEvent {
            lister,
            contract,
            id,
            listing_id,
            min_price,
            end_time,
            timestamp,
        })
    }

    pub fn bid(
        bidder: &'a AccountAddress,
        listing_id: ListingId,
        amount: Amount,
        timestamp: Timestamp,
    ) -> Self {
        Self::Bid(BidEvent {
            bidder,
            listing_id,
            amount,
            timestamp,
        })
    }
}

impl<'a> Serial for AuctionEvent<'a> {
    fn serial<W: Write>(&self, out: &mut W) -> Result<(), W::Err> {
        match self {
            AuctionEvent::List(event) => {
                out.write_u8(LISTING_TAG)?;
                event.serial(out)
            }
            AuctionEvent::Bid(event) => {
                out.write_u8(BIDING_TAG)?;
                event.serial(out)
            }
        }
    }
}
