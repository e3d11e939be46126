use commons::{CustomContractError, ListingId, Token};
use concordium_std::*;

use crate::external::ListingView;

/// Listing status. Starts `Active` and becomes `Ended` exactly once on
/// settlement, never the other way around.
#[derive(Debug, Clone, Copy, Serialize, SchemaType, PartialEq, Eq)]
pub enum ListingStatus {
    Active,
    Ended,
}

/// A single auction: one NFT, one seller, one deadline.
#[derive(Debug, Serialize, SchemaType)]
pub struct Listing {
    /// NFT under auction, held in the engine's custody while active.
    pub token: Token,
    /// Account that created the listing and owned the token at listing
    /// time.
    pub seller: AccountAddress,
    /// Smallest acceptable bid.
    pub min_price: Amount,
    /// Time after which bidding is closed and settlement is allowed.
    pub end_time: Timestamp,
    /// Current highest bid. Zero until the first bid is accepted.
    pub highest_bid: Amount,
    /// Current highest bidder. `None` while `highest_bid` is zero.
    pub highest_bidder: Option<AccountAddress>,
    /// Lifecycle status.
    pub status: ListingStatus,
}

/// Settlement outcome. Describes the single asset transfer the caller
/// must perform after the state transition committed.
#[must_use]
pub enum Settlement {
    /// The highest bidder takes the token. The seller proceeds were
    /// credited to the refundable ledger.
    Winner {
        token: Token,
        winner: AccountAddress,
    },
    /// No bids were placed, the token returns to the seller.
    NoBids {
        token: Token,
        seller: AccountAddress,
    },
}

/// The contract state.
#[derive(Serial, DeserialWithState)]
#[concordium(state_parameter = "S")]
pub struct State<S: HasStateApi> {
    /// Next listing id to be assigned.
    next_listing_id: ListingId,
    /// Every listing ever created. Settled listings are kept so they
    /// stay queryable.
    listings: StateMap<ListingId, Listing, S>,
    /// Refundable balances, holder first: holder -> listing -> amount.
    /// Only the functions of this module write to it.
    pending_returns: StateMap<AccountAddress, StateMap<ListingId, Amount, S>, S>,
    /// Tokens currently held by the engine.
    custody: StateSet<Token, S>,
}

impl<S: HasStateApi> State<S> {
    /// Create a new state with no listings and an empty ledger.
    pub fn empty(state_builder: &mut StateBuilder<S>) -> Self {
        State {
            next_listing_id: 0,
            listings: state_builder.new_map(),
            pending_returns: state_builder.new_map(),
            custody: state_builder.new_set(),
        }
    }

    /// Record a token moved into the engine's custody by the CIS-2
    /// acceptance hook.
    pub fn accept_custody(&mut self, token: Token) {
        self.custody.insert(token);
    }

    pub fn in_custody(&self, token: &Token) -> bool {
        self.custody.contains(token)
    }

    /// Durably write a new listing and assign the next sequential id.
    /// Must only be called once the token is locked in custody.
    pub fn create_listing(
        &mut self,
        token: Token,
        seller: AccountAddress,
        min_price: Amount,
        end_time: Timestamp,
    ) -> ListingId {
        let listing_id = self.next_listing_id;
        self.next_listing_id += 1;
        self.listings.insert(
            listing_id,
            Listing {
                token,
                seller,
                min_price,
                end_time,
                highest_bid: Amount::zero(),
                highest_bidder: None,
                status: ListingStatus::Active,
            },
        );
        listing_id
    }

    /// Validate and apply a bid. On success the previous highest bid,
    /// if there was one, is credited to its owner in the refundable
    /// ledger, exactly once and to no one else.
    pub fn bid(
        &mut self,
        state_builder: &mut StateBuilder<S>,
        listing_id: ListingId,
        bidder: AccountAddress,
        amount: Amount,
        slot_time: Timestamp,
    ) -> Result<(), CustomContractError> {
        let previous = {
            let listing = self
                .listings
                .get(&listing_id)
                .ok_or(CustomContractError::UnknownListing)?;

            // Bidding closes at the deadline whether or not settlement
            // has been invoked yet.
            ensure!(
                slot_time < listing.end_time,
                CustomContractError::AuctionClosed
            );

            // A repeat bid by the current leader must still exceed
            // their own standing bid.
            ensure!(
                amount >= listing.min_price && amount > listing.highest_bid,
                CustomContractError::BidTooLow
            );

            listing
                .highest_bidder
                .map(|account| (account, listing.highest_bid))
        };

        // Credit the outgoing leader before touching the listing, so a
        // failed credit leaves the listing as it was.
        if let Some((account, refund)) = previous {
            self.credit(state_builder, account, listing_id, refund)?;
        }

        let mut listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or(CustomContractError::UnknownListing)?;
        listing.highest_bid = amount;
        listing.highest_bidder = Some(bidder);

        Ok(())
    }

    /// Drive a listing through its one-shot `Active -> Ended`
    /// transition. Succeeds at most once per listing; the caller must
    /// perform the returned asset transfer.
    pub fn settle(
        &mut self,
        state_builder: &mut StateBuilder<S>,
        listing_id: ListingId,
        slot_time: Timestamp,
    ) -> Result<Settlement, CustomContractError> {
        let (token, seller, winner) = {
            let mut listing = self
                .listings
                .get_mut(&listing_id)
                .ok_or(CustomContractError::UnknownListing)?;

            ensure!(
                listing.status == ListingStatus::Active,
                CustomContractError::AlreadySettled
            );
            ensure!(
                slot_time >= listing.end_time,
                CustomContractError::NotExpired
            );

            listing.status = ListingStatus::Ended;

            let winner = listing
                .highest_bidder
                .map(|account| (account, listing.highest_bid));
            (listing.token.clone(), listing.seller, winner)
        };

        self.custody.remove(&token);

        match winner {
            Some((winner, winning_bid)) => {
                self.credit(state_builder, seller, listing_id, winning_bid)?;
                Ok(Settlement::Winner { token, winner })
            }
            None => Ok(Settlement::NoBids { token, seller }),
        }
    }

    /// Remove and sum every refundable entry owed to `holder`. The
    /// entries leave the ledger before any funds move, so a credited
    /// amount can never be observed twice.
    pub fn drain_pending_returns(
        &mut self,
        holder: AccountAddress,
    ) -> Result<Amount, CustomContractError> {
        let mut total = Amount::zero();
        if let Some(entries) = self.pending_returns.remove_and_get(&holder) {
            for (_, amount) in entries.iter() {
                total = checked_add(total, *amount)?;
            }
            entries.delete();
        }
        Ok(total)
    }

    /// Refundable amount currently owed to `holder` for one listing.
    pub fn pending_return(&self, holder: &AccountAddress, listing_id: ListingId) -> Amount {
        self.pending_returns
            .get(holder)
            .and_then(|entries| entries.get(&listing_id).map(|amount| *amount))
            .unwrap_or_else(Amount::zero)
    }

    /// Look up a listing for the view entrypoint.
    pub fn view_listing(&self, listing_id: ListingId) -> Result<ListingView, CustomContractError> {
        let listing = self
            .listings
            .get(&listing_id)
            .ok_or(CustomContractError::UnknownListing)?;
        Ok(ListingView {
            contract: listing.token.contract,
            id: listing.token.id.clone(),
            highest_bid: listing.highest_bid,
            min_price: listing.min_price,
            end_time: listing.end_time,
        })
    }

    /// Credit a refundable ledger entry for `(listing_id, holder)`.
    fn credit(
        &mut self,
        state_builder: &mut StateBuilder<S>,
        holder: AccountAddress,
        listing_id: ListingId,
        amount: Amount,
    ) -> Result<(), CustomContractError> {
        let mut entries = self
            .pending_returns
            .entry(holder)
            .or_insert_with(|| state_builder.new_map());
        let mut entry = entries.entry(listing_id).or_insert_with(Amount::zero);
        *entry = checked_add(*entry, amount)?;
        Ok(())
    }
}

fn checked_add(a: Amount, b: Amount) -> Result<Amount, CustomContractError> {
    a.micro_ccd
        .checked_add(b.micro_ccd)
        .map(Amount::from_micro_ccd)
        .ok_or(CustomContractError::Overflow)
}

#[concordium_cfg_test]
mod tests {
    use concordium_cis2::TokenIdVec;
    use concordium_std::test_infrastructure::*;

    use super::*;

    const SELLER: AccountAddress = AccountAddress([0u8; 32]);
    const BIDDER_A: AccountAddress = AccountAddress([1u8; 32]);
    const BIDDER_B: AccountAddress = AccountAddress([2u8; 32]);

    const NFT_CONTRACT: ContractAddress = ContractAddress {
        index: 1,
        subindex: 0,
    };

    const AUCTION_END: u64 = 3_600_000;

    fn token_0() -> Token {
        Token {
            contract: NFT_CONTRACT,
            id: TokenIdVec(vec![0, 1]),
        }
    }

    /// Drives the state through operation sequences while tracking the
    /// CCD the engine would hold in custody, checking the solvency
    /// equation after every operation: custody equals the sum of
    /// active-listing high bids plus all refundable entries.
    struct Harness {
        state: State<TestStateApi>,
        state_builder: TestStateBuilder,
        custody: u64,
    }

    impl Harness {
        fn new() -> Self {
            let mut state_builder = TestStateBuilder::new();
            let state = State::empty(&mut state_builder);
            Harness {
                state,
                state_builder,
                custody: 0,
            }
        }

        fn list(&mut self, min_price: u64, end_time: u64) -> ListingId {
            self.state.accept_custody(token_0());
            let listing_id = self.state.create_listing(
                token_0(),
                SELLER,
                Amount::from_micro_ccd(min_price),
                Timestamp::from_timestamp_millis(end_time),
            );
            self.check_solvency();
            listing_id
        }

        fn bid(
            &mut self,
            listing_id: ListingId,
            bidder: AccountAddress,
            amount: u64,
            slot_time: u64,
        ) -> Result<(), CustomContractError> {
            let result = self.state.bid(
                &mut self.state_builder,
                listing_id,
                bidder,
                Amount::from_micro_ccd(amount),
                Timestamp::from_timestamp_millis(slot_time),
            );
            if result.is_ok() {
                self.custody += amount;
            }
            self.check_solvency();
            result
        }

        fn settle(
            &mut self,
            listing_id: ListingId,
            slot_time: u64,
        ) -> Result<Settlement, CustomContractError> {
            let result = self.state.settle(
                &mut self.state_builder,
                listing_id,
                Timestamp::from_timestamp_millis(slot_time),
            );
            self.check_solvency();
            result
        }

        fn withdraw(&mut self, holder: AccountAddress) -> u64 {
            let total = self
                .state
                .drain_pending_returns(holder)
                .expect("Draining the ledger should not overflow");
            self.custody -= total.micro_ccd;
            self.check_solvency();
            total.micro_ccd
        }

        fn highest_bid(&self, listing_id: ListingId) -> u64 {
            self.state
                .view_listing(listing_id)
                .expect("Listing should exist")
                .highest_bid
                .micro_ccd
        }

        fn check_solvency(&self) {
            let active: u64 = self
                .state
                .listings
                .iter()
                .filter(|(_, listing)| listing.status == ListingStatus::Active)
                .map(|(_, listing)| listing.highest_bid.micro_ccd)
                .sum();
            let mut refundable: u64 = 0;
            for (_, entries) in self.state.pending_returns.iter() {
                for (_, amount) in entries.iter() {
                    refundable += amount.micro_ccd;
                }
            }
            claim_eq!(
                self.custody,
                active + refundable,
                "Custody must equal active high bids plus refundable entries"
            );
        }
    }

    #[concordium_test]
    /// Full auction sequence with the solvency equation checked after
    /// every operation:
    /// 1. Listing created with minimum price 10.
    /// 2. A bids 15, B bids 17, A is credited 15.
    /// 3. A withdraws 15, B withdraws nothing (still leading).
    /// 4. Settlement credits the seller 17 and names B the winner.
    /// 5. The seller withdraws 17, leaving the engine empty.
    fn test_solvency_through_full_auction() {
        let mut harness = Harness::new();
        let listing_id = harness.list(10, AUCTION_END);

        harness
            .bid(listing_id, BIDDER_A, 15, 1_000)
            .expect("First bid should pass");
        harness
            .bid(listing_id, BIDDER_B, 17, 2_000)
            .expect("Overbid should pass");

        claim_eq!(
            harness.state.pending_return(&BIDDER_A, listing_id),
            Amount::from_micro_ccd(15),
            "Outbid bidder must be credited their former bid"
        );

        claim_eq!(harness.withdraw(BIDDER_A), 15);
        claim_eq!(harness.withdraw(BIDDER_B), 0, "Leading bid stays locked");

        let settlement = harness
            .settle(listing_id, AUCTION_END)
            .expect("Settlement at the deadline should pass");
        match settlement {
            Settlement::Winner { winner, token } => {
                claim_eq!(winner, BIDDER_B);
                claim_eq!(token, token_0());
            }
            Settlement::NoBids { .. } => fail!("Expected a winner"),
        }

        claim_eq!(harness.withdraw(SELLER), 17);
        claim_eq!(harness.custody, 0);
    }

    #[concordium_test]
    /// The highest bid never decreases, and rejected bids leave the
    /// listing untouched.
    fn test_highest_bid_monotonic() {
        let mut harness = Harness::new();
        let listing_id = harness.list(10, AUCTION_END);

        let attempts: [(AccountAddress, u64); 5] = [
            (BIDDER_A, 9),
            (BIDDER_A, 15),
            (BIDDER_B, 15),
            (BIDDER_B, 17),
            (BIDDER_A, 16),
        ];

        let mut previous_high = 0;
        for (slot_time, (bidder, amount)) in attempts.iter().enumerate() {
            let _ = harness.bid(listing_id, *bidder, *amount, slot_time as u64);
            let high = harness.highest_bid(listing_id);
            claim!(high >= previous_high, "Highest bid must be non-decreasing");
            previous_high = high;
        }
        claim_eq!(previous_high, 17);
    }

    #[concordium_test]
    /// A bid below the minimum price or not above the current high bid
    /// is rejected without mutating state.
    fn test_rejected_bid_mutates_nothing() {
        let mut harness = Harness::new();
        let listing_id = harness.list(10, AUCTION_END);

        claim_eq!(
            harness.bid(listing_id, BIDDER_A, 9, 1_000),
            Err(CustomContractError::BidTooLow)
        );
        claim_eq!(harness.highest_bid(listing_id), 0);

        harness
            .bid(listing_id, BIDDER_A, 15, 1_000)
            .expect("Valid bid should pass");
        claim_eq!(
            harness.bid(listing_id, BIDDER_B, 15, 1_000),
            Err(CustomContractError::BidTooLow),
            "A matching bid is not strictly greater"
        );
        claim_eq!(
            harness.state.pending_return(&BIDDER_A, listing_id),
            Amount::zero(),
            "A rejected bid must not credit anyone"
        );
    }

    #[concordium_test]
    /// A repeat bid by the current leader must exceed their own bid and
    /// credits their former bid back to them.
    fn test_leader_overbids_self() {
        let mut harness = Harness::new();
        let listing_id = harness.list(10, AUCTION_END);

        harness
            .bid(listing_id, BIDDER_A, 15, 1_000)
            .expect("First bid should pass");
        claim_eq!(
            harness.bid(listing_id, BIDDER_A, 15, 1_100),
            Err(CustomContractError::BidTooLow)
        );
        harness
            .bid(listing_id, BIDDER_A, 18, 1_200)
            .expect("Raising own bid should pass");

        claim_eq!(
            harness.state.pending_return(&BIDDER_A, listing_id),
            Amount::from_micro_ccd(15)
        );
        claim_eq!(harness.withdraw(BIDDER_A), 15);
    }

    #[concordium_test]
    /// Settlement succeeds at most once and only after the deadline.
    fn test_settle_exactly_once() {
        let mut harness = Harness::new();
        let listing_id = harness.list(10, AUCTION_END);

        claim_eq!(
            harness.settle(listing_id, AUCTION_END - 1).err(),
            Some(CustomContractError::NotExpired)
        );

        let settlement = harness
            .settle(listing_id, AUCTION_END)
            .expect("Settlement at the deadline should pass");
        match settlement {
            Settlement::NoBids { seller, .. } => claim_eq!(seller, SELLER),
            Settlement::Winner { .. } => fail!("No bids were placed"),
        }

        claim_eq!(
            harness.settle(listing_id, AUCTION_END + 1).err(),
            Some(CustomContractError::AlreadySettled)
        );
    }

    #[concordium_test]
    /// Settled listings stay queryable; unknown ids are distinguished
    /// from listings that simply never received a bid.
    fn test_listing_store_queries() {
        let mut harness = Harness::new();
        let listing_id = harness.list(10, AUCTION_END);

        claim_eq!(
            harness.state.view_listing(listing_id + 1).err(),
            Some(CustomContractError::UnknownListing)
        );
        claim_eq!(harness.highest_bid(listing_id), 0);

        harness
            .settle(listing_id, AUCTION_END)
            .map(|_| ())
            .expect("Settlement should pass");
        let view = harness
            .state
            .view_listing(listing_id)
            .expect("Settled listing must stay queryable");
        claim_eq!(view.min_price, Amount::from_micro_ccd(10));
    }

    #[concordium_test]
    /// Draining an empty ledger is a no-op, not an error.
    fn test_zero_withdrawal_is_noop() {
        let mut harness = Harness::new();
        claim_eq!(harness.withdraw(BIDDER_A), 0);
    }

    #[concordium_test]
    /// Listing ids are assigned sequentially from zero.
    fn test_sequential_listing_ids() {
        let mut harness = Harness::new();
        claim_eq!(harness.list(10, AUCTION_END), 0);
        claim_eq!(harness.list(20, AUCTION_END), 1);
        claim_eq!(harness.list(30, AUCTION_END), 2);
    }

    #[concordium_test]
    /// An outbid credit that would overflow the holder's refundable
    /// entry is a typed abort that leaves the listing and the ledger
    /// untouched.
    fn test_outbid_credit_overflow() {
        let mut state_builder = TestStateBuilder::new();
        let mut state = State::empty(&mut state_builder);
        state.accept_custody(token_0());
        let listing_id = state.create_listing(
            token_0(),
            SELLER,
            Amount::from_micro_ccd(10),
            Timestamp::from_timestamp_millis(AUCTION_END),
        );

        // A ends up holding a near-limit refundable entry while also
        // being the outgoing leader a second time.
        let huge = u64::MAX - 10;
        let bids: [(AccountAddress, u64); 3] = [
            (BIDDER_A, huge),
            (BIDDER_B, huge + 5),
            (BIDDER_A, huge + 6),
        ];
        for (slot_time, (bidder, amount)) in bids.iter().enumerate() {
            state
                .bid(
                    &mut state_builder,
                    listing_id,
                    *bidder,
                    Amount::from_micro_ccd(*amount),
                    Timestamp::from_timestamp_millis(slot_time as u64),
                )
                .expect("Valid bid should pass");
        }
        claim_eq!(
            state.pending_return(&BIDDER_A, listing_id),
            Amount::from_micro_ccd(huge)
        );

        // Crediting A's standing bid on top of the existing entry
        // would exceed the amount limit.
        claim_eq!(
            state.bid(
                &mut state_builder,
                listing_id,
                BIDDER_B,
                Amount::from_micro_ccd(huge + 7),
                Timestamp::from_timestamp_millis(4),
            ),
            Err(CustomContractError::Overflow)
        );
        let view = state
            .view_listing(listing_id)
            .expect("Listing should exist");
        claim_eq!(
            view.highest_bid,
            Amount::from_micro_ccd(huge + 6),
            "A rejected credit must not move the highest bid"
        );
        claim_eq!(
            state.pending_return(&BIDDER_A, listing_id),
            Amount::from_micro_ccd(huge),
            "A rejected credit must not change the ledger"
        );
    }
}
