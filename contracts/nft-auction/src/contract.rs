use commons::{
    ContractError, ContractResult, ContractTokenAmount, ContractTokenId, CustomContractError,
    ListingId, Token,
};
use concordium_cis2::OnReceivingCis2Params;
use concordium_std::*;

use crate::events::AuctionEvent;
use crate::external::{ListParams, ListingView};
use crate::nft;
use crate::state::{Settlement, State};

/// Initialize the auction engine with no listings and an empty ledger.
#[init(contract = "NftAuction")]
fn init<S: HasStateApi>(
    _ctx: &impl HasInitContext,
    state_builder: &mut StateBuilder<S>,
) -> InitResult<State<S>> {
    Ok(State::empty(state_builder))
}

/// Put an NFT up for timed auction.
///
/// The caller must own the token and must have approved this contract
/// as an operator on the NFT contract beforehand. The token is pulled
/// into the engine's custody before the listing is written; if the NFT
/// contract does not hand custody over through the acceptance hook,
/// the whole operation rejects and no listing is created.
#[receive(
    mutable,
    contract = "NftAuction",
    name = "list",
    parameter = "ListParams",
    return_value = "ListingId",
    enable_logger
)]
fn list<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ContractResult<ListingId> {
    let params = ListParams::deserial(&mut ctx.parameter_cursor())?;

    let seller = match ctx.sender() {
        Address::Account(account) => account,
        Address::Contract(_) => bail!(CustomContractError::OnlyAccountAddress.into()),
    };

    ensure!(
        params.duration_hours > 0,
        CustomContractError::InvalidDuration.into()
    );

    // The custodian must confirm ownership and prior approval before
    // the token is moved.
    ensure!(
        nft::balance_of(host, &params.token, seller)? == ContractTokenAmount::from(1),
        ContractError::Unauthorized
    );
    ensure!(
        nft::is_operator(host, &params.token.contract, seller, ctx.self_address())?,
        ContractError::Unauthorized
    );

    // Pull the token into custody. The NFT contract invokes the
    // acceptance hook synchronously during this call; the listing is
    // only written once custody is confirmed.
    nft::transfer_to_self(host, params.token.clone(), seller, ctx.self_address())?;
    ensure!(
        host.state().in_custody(&params.token),
        CustomContractError::Incompatible.into()
    );

    let slot_time = ctx.metadata().slot_time();
    let end_time = slot_time
        .checked_add(Duration::from_hours(u64::from(params.duration_hours)))
        .ok_or(CustomContractError::Overflow)?;

    let listing_id = host.state_mut().create_listing(
        params.token.clone(),
        seller,
        params.min_price,
        end_time,
    );

    logger.log(&AuctionEvent::list(
        &seller,
        &params.token.contract,
        &params.token.id,
        listing_id,
        params.min_price,
        end_time,
        slot_time,
    ))?;

    Ok(listing_id)
}

/// CIS-2 acceptance hook. The NFT contract invokes this entrypoint
/// while transferring a token to the engine; recording the token here
/// finalizes the custody lock. Rejecting aborts the transfer.
#[receive(
    mutable,
    contract = "NftAuction",
    name = "onReceivingCis2",
    parameter = "OnReceivingCis2Params<ContractTokenId, ContractTokenAmount>"
)]
fn on_receiving_cis2<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<()> {
    let params = OnReceivingCis2Params::<ContractTokenId, ContractTokenAmount>::deserial(
        &mut ctx.parameter_cursor(),
    )?;

    // Do not take custody of anything if no tokens were transferred.
    if params.amount == ContractTokenAmount::from(0) {
        return Ok(());
    }
    ensure!(
        params.amount == ContractTokenAmount::from(1),
        CustomContractError::Unsupported.into()
    );
    ensure!(
        matches!(params.from, Address::Account(_)),
        CustomContractError::Unsupported.into()
    );

    let contract = match ctx.sender() {
        Address::Contract(contract) => contract,
        Address::Account(_) => bail!(CustomContractError::ContractOnly.into()),
    };

    host.state_mut().accept_custody(Token {
        contract,
        id: params.token_id,
    });

    Ok(())
}

/// Place a bid on a listing. The attached CCD moves into the engine's
/// custody; the previous highest bid, if any, becomes refundable to
/// its owner and can be recovered through `withdraw`.
#[receive(
    mutable,
    payable,
    contract = "NftAuction",
    name = "bid",
    parameter = "ListingId",
    enable_logger
)]
fn bid<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    amount: Amount,
    logger: &mut impl HasLogger,
) -> ContractResult<()> {
    let listing_id: ListingId = ctx.parameter_cursor().get()?;

    let bidder = match ctx.sender() {
        Address::Account(account) => account,
        Address::Contract(_) => bail!(CustomContractError::OnlyAccountAddress.into()),
    };

    let slot_time = ctx.metadata().slot_time();
    let (state, state_builder) = host.state_and_builder();
    state.bid(state_builder, listing_id, bidder, amount, slot_time)?;

    logger.log(&AuctionEvent::bid(&bidder, listing_id, amount, slot_time))?;

    Ok(())
}

/// Settle an expired listing. Callable by anyone, effective exactly
/// once: the token moves to the highest bidder, or back to the seller
/// when no bids were placed, and the winning bid becomes refundable to
/// the seller. No funds are pushed here; payouts only happen through
/// `withdraw`.
#[receive(mutable, contract = "NftAuction", name = "end", parameter = "ListingId")]
fn end<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<()> {
    let listing_id: ListingId = ctx.parameter_cursor().get()?;

    let slot_time = ctx.metadata().slot_time();
    let (state, state_builder) = host.state_and_builder();
    let settlement = state.settle(state_builder, listing_id, slot_time)?;

    match settlement {
        Settlement::Winner { token, winner } => {
            nft::transfer_from_self(host, token, ctx.self_address(), winner)?;
        }
        Settlement::NoBids { token, seller } => {
            nft::transfer_from_self(host, token, ctx.self_address(), seller)?;
        }
    }

    Ok(())
}

/// Withdraw every refundable balance owed to the caller across all
/// listings. The ledger entries are removed before the transfer, so a
/// credited amount can never be paid out twice. A zero balance is a
/// successful no-op.
#[receive(mutable, contract = "NftAuction", name = "withdraw")]
fn withdraw<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<()> {
    let caller = match ctx.sender() {
        Address::Account(account) => account,
        Address::Contract(_) => bail!(CustomContractError::OnlyAccountAddress.into()),
    };

    let total = host.state_mut().drain_pending_returns(caller)?;
    if total > Amount::zero() {
        host.invoke_transfer(&caller, total)
            .map_err(|_| CustomContractError::InvokeTransferError)?;
    }

    Ok(())
}

/// View function that returns the contents of a listing.
#[receive(
    contract = "NftAuction",
    name = "view",
    parameter = "ListingId",
    return_value = "ListingView"
)]
fn view<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ContractResult<ListingView> {
    let listing_id: ListingId = ctx.parameter_cursor().get()?;
    Ok(host.state().view_listing(listing_id)?)
}

#[concordium_cfg_test]
mod tests {
    use core::fmt::Debug;

    use concordium_cis2::{
        AdditionalData, BalanceOfQueryParams, BalanceOfQueryResponse, OperatorOfQueryParams,
        OperatorOfQueryResponse, Receiver, TokenIdVec, TransferParams,
    };
    use concordium_std::test_infrastructure::*;

    use super::*;

    const SELLER: AccountAddress = AccountAddress([0u8; 32]);
    const BIDDER_A: AccountAddress = AccountAddress([1u8; 32]);
    const BIDDER_B: AccountAddress = AccountAddress([2u8; 32]);

    const NFT_CONTRACT: ContractAddress = ContractAddress {
        index: 1,
        subindex: 0,
    };

    const ENGINE: ContractAddress = ContractAddress {
        index: 5,
        subindex: 0,
    };

    const LISTED_AT: u64 = 1_000;
    const HOUR_MS: u64 = 3_600_000;

    fn token_0() -> Token {
        Token {
            contract: NFT_CONTRACT,
            id: TokenIdVec(vec![0, 1]),
        }
    }

    fn expect_error<E, T>(expr: Result<T, E>, err: E, msg: &str)
    where
        E: Eq + Debug,
        T: Debug,
    {
        let actual = expr.expect_err(msg);
        claim_eq!(actual, err);
    }

    fn new_ctx<'a>(sender: AccountAddress, slot_time: u64) -> TestReceiveContext<'a> {
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(sender));
        ctx.set_self_address(ENGINE);
        ctx.set_metadata_slot_time(Timestamp::from_timestamp_millis(slot_time));
        ctx
    }

    fn new_host() -> TestHost<State<TestStateApi>> {
        let mut state_builder = TestStateBuilder::new();
        let state = State::empty(&mut state_builder);
        TestHost::new(state, state_builder)
    }

    /// Wire up a mock NFT contract that reports `owner` as holding the
    /// token, answers the operator query with `approved`, and hands
    /// over custody on transfers to the engine the way the acceptance
    /// hook would.
    fn setup_nft(host: &mut TestHost<State<TestStateApi>>, owner: AccountAddress, approved: bool) {
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            MockFn::new_v1(move |param, _, _, _| {
                let params = BalanceOfQueryParams::<ContractTokenId>::deserial(&mut Cursor::new(
                    param.as_ref(),
                ))
                .map_err(|_| CallContractError::Trap)?;
                let response: Vec<ContractTokenAmount> = params
                    .queries
                    .iter()
                    .map(|query| {
                        if query.address == Address::Account(owner) {
                            ContractTokenAmount::from(1)
                        } else {
                            ContractTokenAmount::from(0)
                        }
                    })
                    .collect();
                Ok((false, BalanceOfQueryResponse::from(response)))
            }),
        );
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("operatorOf".into()),
            MockFn::new_v1(move |param, _, _, _| {
                let params = OperatorOfQueryParams::deserial(&mut Cursor::new(param.as_ref()))
                    .map_err(|_| CallContractError::Trap)?;
                Ok((
                    false,
                    OperatorOfQueryResponse::from(vec![approved; params.queries.len()]),
                ))
            }),
        );
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            MockFn::new_v1(
                |param, _, _, state: &mut State<TestStateApi>| {
                    let params = TransferParams::<ContractTokenId, ContractTokenAmount>::deserial(
                        &mut Cursor::new(param.as_ref()),
                    )
                    .map_err(|_| CallContractError::Trap)?;
                    // Mirror the acceptance hook: tokens sent to the
                    // engine enter its custody.
                    for transfer in params.0 {
                        if let Receiver::Contract(..) = transfer.to {
                            state.accept_custody(Token {
                                contract: NFT_CONTRACT,
                                id: transfer.token_id,
                            });
                        }
                    }
                    Ok((true, ()))
                },
            ),
        );
    }

    /// Replace the transfer mock with one that rejects any transfer
    /// not going to `expected`.
    fn expect_nft_transfer_to(host: &mut TestHost<State<TestStateApi>>, expected: AccountAddress) {
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            MockFn::new_v1(
                move |param, _, _, _state: &mut State<TestStateApi>| {
                    let params = TransferParams::<ContractTokenId, ContractTokenAmount>::deserial(
                        &mut Cursor::new(param.as_ref()),
                    )
                    .map_err(|_| CallContractError::Trap)?;
                    for transfer in params.0 {
                        match transfer.to {
                            Receiver::Account(account) if account == expected => (),
                            _ => return Err(CallContractError::Trap),
                        }
                    }
                    Ok((false, ()))
                },
            ),
        );
    }

    fn list_token(
        host: &mut TestHost<State<TestStateApi>>,
        seller: AccountAddress,
        min_price: u64,
        duration_hours: u32,
    ) -> ContractResult<ListingId> {
        let params = ListParams {
            token: token_0(),
            min_price: Amount::from_micro_ccd(min_price),
            duration_hours,
        };
        let parameter_bytes = to_bytes(&params);
        let mut ctx = new_ctx(seller, LISTED_AT);
        ctx.set_parameter(&parameter_bytes);
        let mut logger = TestLogger::init();
        list(&ctx, host, &mut logger)
    }

    fn place_bid(
        host: &mut TestHost<State<TestStateApi>>,
        bidder: AccountAddress,
        listing_id: ListingId,
        micro_ccd: u64,
        slot_time: u64,
    ) -> ContractResult<()> {
        let parameter_bytes = to_bytes(&listing_id);
        let mut ctx = new_ctx(bidder, slot_time);
        ctx.set_parameter(&parameter_bytes);
        let mut logger = TestLogger::init();
        bid(&ctx, host, Amount::from_micro_ccd(micro_ccd), &mut logger)
    }

    fn call_end(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
        listing_id: ListingId,
        slot_time: u64,
    ) -> ContractResult<()> {
        let parameter_bytes = to_bytes(&listing_id);
        let mut ctx = new_ctx(sender, slot_time);
        ctx.set_parameter(&parameter_bytes);
        end(&ctx, host)
    }

    fn call_withdraw(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
        slot_time: u64,
    ) -> ContractResult<()> {
        let ctx = new_ctx(sender, slot_time);
        withdraw(&ctx, host)
    }

    fn get_listing(host: &TestHost<State<TestStateApi>>, listing_id: ListingId) -> ListingView {
        host.state()
            .view_listing(listing_id)
            .expect("Listing should exist")
    }

    #[concordium_test]
    /// Contract initialization produces a state without any listings.
    fn test_init() {
        let ctx = TestInitContext::empty();
        let mut state_builder = TestStateBuilder::new();

        let state = init(&ctx, &mut state_builder).expect("Initialization should pass");
        claim_eq!(
            state.view_listing(0).err(),
            Some(CustomContractError::UnknownListing),
            "Fresh state must not contain listings"
        );
    }

    #[concordium_test]
    /// Listing an owned, pre-approved token locks it in custody and
    /// writes an active listing with the next sequential id.
    fn test_list() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);

        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");
        claim_eq!(listing_id, 0);

        let view = get_listing(&host, listing_id);
        claim_eq!(
            view,
            ListingView {
                contract: NFT_CONTRACT,
                id: TokenIdVec(vec![0, 1]),
                highest_bid: Amount::zero(),
                min_price: Amount::from_micro_ccd(10),
                end_time: Timestamp::from_timestamp_millis(LISTED_AT + HOUR_MS),
            }
        );
        claim!(
            host.state().in_custody(&token_0()),
            "Listed token must be in custody"
        );

        let second = list_token(&mut host, SELLER, 10, 2).expect("Listing should pass");
        claim_eq!(second, 1, "Listing ids are sequential");
    }

    #[concordium_test]
    /// The List event carries the listing id, price, deadline and
    /// creation time.
    fn test_list_logs_event() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);

        let params = ListParams {
            token: token_0(),
            min_price: Amount::from_micro_ccd(10),
            duration_hours: 1,
        };
        let parameter_bytes = to_bytes(&params);
        let mut ctx = new_ctx(SELLER, LISTED_AT);
        ctx.set_parameter(&parameter_bytes);
        let mut logger = TestLogger::init();

        let listing_id = list(&ctx, &mut host, &mut logger).expect("Listing should pass");

        claim_eq!(logger.logs.len(), 1, "Exactly one List event is emitted");
        let expected = to_bytes(&AuctionEvent::list(
            &SELLER,
            &NFT_CONTRACT,
            &TokenIdVec(vec![0, 1]),
            listing_id,
            Amount::from_micro_ccd(10),
            Timestamp::from_timestamp_millis(LISTED_AT + HOUR_MS),
            Timestamp::from_timestamp_millis(LISTED_AT),
        ));
        claim_eq!(logger.logs[0], expected);
    }

    #[concordium_test]
    /// A zero duration is rejected before the NFT contract is queried.
    fn test_list_rejects_zero_duration() {
        let mut host = new_host();

        expect_error(
            list_token(&mut host, SELLER, 10, 0),
            CustomContractError::InvalidDuration.into(),
            "Listing with zero duration should fail",
        );
    }

    #[concordium_test]
    /// Listing someone else's token is rejected.
    fn test_list_rejects_non_owner() {
        let mut host = new_host();
        setup_nft(&mut host, BIDDER_A, true);

        expect_error(
            list_token(&mut host, SELLER, 10, 1),
            ContractError::Unauthorized,
            "Listing a token the caller does not own should fail",
        );
    }

    #[concordium_test]
    /// Listing without prior operator approval is rejected.
    fn test_list_rejects_missing_approval() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, false);

        expect_error(
            list_token(&mut host, SELLER, 10, 1),
            ContractError::Unauthorized,
            "Listing without operator approval should fail",
        );
    }

    #[concordium_test]
    /// A deadline computation that would exceed the timestamp limit is
    /// a typed abort and writes no listing.
    fn test_list_rejects_deadline_overflow() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);

        let params = ListParams {
            token: token_0(),
            min_price: Amount::from_micro_ccd(10),
            duration_hours: 1,
        };
        let parameter_bytes = to_bytes(&params);
        let mut ctx = new_ctx(SELLER, u64::MAX - 1);
        ctx.set_parameter(&parameter_bytes);
        let mut logger = TestLogger::init();

        expect_error(
            list(&ctx, &mut host, &mut logger),
            CustomContractError::Overflow.into(),
            "Listing past the timestamp limit should fail",
        );
        claim_eq!(
            host.state().view_listing(0).err(),
            Some(CustomContractError::UnknownListing),
            "No listing must be written"
        );
    }

    #[concordium_test]
    /// A transfer that claims success without handing the token over
    /// through the acceptance hook rejects the listing; nothing is
    /// written.
    fn test_list_rejects_missing_custody_handover() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            MockFn::new_v1(|_, _, _, _state: &mut State<TestStateApi>| Ok((false, ()))),
        );

        expect_error(
            list_token(&mut host, SELLER, 10, 1),
            CustomContractError::Incompatible.into(),
            "Listing without a custody hand-over should fail",
        );
        claim!(
            !host.state().in_custody(&token_0()),
            "The token must not be in custody"
        );
        claim_eq!(
            host.state().view_listing(0).err(),
            Some(CustomContractError::UnknownListing),
            "No listing must be written"
        );
    }

    #[concordium_test]
    /// The acceptance hook records custody for a single token sent by
    /// the NFT contract and rejects anything else.
    fn test_acceptance_hook() {
        let mut host = new_host();

        let params = OnReceivingCis2Params::<ContractTokenId, ContractTokenAmount> {
            token_id: TokenIdVec(vec![0, 1]),
            amount: ContractTokenAmount::from(1),
            from: Address::Account(SELLER),
            data: AdditionalData::empty(),
        };
        let parameter_bytes = to_bytes(&params);
        let mut ctx = new_ctx(SELLER, LISTED_AT);
        ctx.set_sender(Address::Contract(NFT_CONTRACT));
        ctx.set_parameter(&parameter_bytes);

        on_receiving_cis2(&ctx, &mut host).expect("Acceptance should pass");
        claim!(host.state().in_custody(&token_0()));

        // Account senders cannot fake a custody hand-over.
        let mut ctx = new_ctx(SELLER, LISTED_AT);
        ctx.set_parameter(&parameter_bytes);
        expect_error(
            on_receiving_cis2(&ctx, &mut host),
            CustomContractError::ContractOnly.into(),
            "Acceptance from an account sender should fail",
        );

        // Batches are not supported.
        let params = OnReceivingCis2Params::<ContractTokenId, ContractTokenAmount> {
            token_id: TokenIdVec(vec![7]),
            amount: ContractTokenAmount::from(2),
            from: Address::Account(SELLER),
            data: AdditionalData::empty(),
        };
        let parameter_bytes = to_bytes(&params);
        let mut ctx = new_ctx(SELLER, LISTED_AT);
        ctx.set_sender(Address::Contract(NFT_CONTRACT));
        ctx.set_parameter(&parameter_bytes);
        expect_error(
            on_receiving_cis2(&ctx, &mut host),
            CustomContractError::Unsupported.into(),
            "Multi-token acceptance should fail",
        );

        // Only tokens coming from an account are accepted.
        let params = OnReceivingCis2Params::<ContractTokenId, ContractTokenAmount> {
            token_id: TokenIdVec(vec![7]),
            amount: ContractTokenAmount::from(1),
            from: Address::Contract(ENGINE),
            data: AdditionalData::empty(),
        };
        let parameter_bytes = to_bytes(&params);
        let mut ctx = new_ctx(SELLER, LISTED_AT);
        ctx.set_sender(Address::Contract(NFT_CONTRACT));
        ctx.set_parameter(&parameter_bytes);
        expect_error(
            on_receiving_cis2(&ctx, &mut host),
            CustomContractError::Unsupported.into(),
            "Acceptance from a contract holder should fail",
        );
        claim!(
            !host.state().in_custody(&Token {
                contract: NFT_CONTRACT,
                id: TokenIdVec(vec![7]),
            }),
            "Rejected transfers must not enter custody"
        );
    }

    #[concordium_test]
    /// Bidding on an id that was never assigned fails with a distinct
    /// error.
    fn test_bid_unknown_listing() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        expect_error(
            place_bid(&mut host, BIDDER_A, 9, 100, LISTED_AT + 1),
            CustomContractError::UnknownListing.into(),
            "Bidding on an unknown listing should fail",
        );
    }

    #[concordium_test]
    /// Bids below the minimum price or not strictly above the current
    /// high bid are rejected and leave the listing untouched.
    fn test_bid_too_low() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        expect_error(
            place_bid(&mut host, BIDDER_A, listing_id, 9, LISTED_AT + 1),
            CustomContractError::BidTooLow.into(),
            "Bidding below the minimum price should fail",
        );
        claim_eq!(get_listing(&host, listing_id).highest_bid, Amount::zero());

        place_bid(&mut host, BIDDER_A, listing_id, 15, LISTED_AT + 2)
            .expect("Valid bid should pass");
        expect_error(
            place_bid(&mut host, BIDDER_B, listing_id, 15, LISTED_AT + 3),
            CustomContractError::BidTooLow.into(),
            "A bid equal to the current high bid should fail",
        );
        claim_eq!(
            get_listing(&host, listing_id).highest_bid,
            Amount::from_micro_ccd(15)
        );
    }

    #[concordium_test]
    /// Bids at or past the deadline are rejected even before `end` has
    /// been called.
    fn test_bid_after_deadline() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        expect_error(
            place_bid(&mut host, BIDDER_A, listing_id, 10_000, LISTED_AT + HOUR_MS),
            CustomContractError::AuctionClosed.into(),
            "Bidding exactly at the deadline should fail",
        );
        expect_error(
            place_bid(
                &mut host,
                BIDDER_A,
                listing_id,
                10_000,
                LISTED_AT + HOUR_MS + 1,
            ),
            CustomContractError::AuctionClosed.into(),
            "Bidding after the deadline should fail",
        );
    }

    #[concordium_test]
    /// An accepted bid logs a Bid event with the bid time.
    fn test_bid_logs_event() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        let parameter_bytes = to_bytes(&listing_id);
        let mut ctx = new_ctx(BIDDER_A, LISTED_AT + 5);
        ctx.set_parameter(&parameter_bytes);
        let mut logger = TestLogger::init();

        bid(&ctx, &mut host, Amount::from_micro_ccd(15), &mut logger)
            .expect("Valid bid should pass");

        claim_eq!(logger.logs.len(), 1, "Exactly one Bid event is emitted");
        let expected = to_bytes(&AuctionEvent::bid(
            &BIDDER_A,
            listing_id,
            Amount::from_micro_ccd(15),
            Timestamp::from_timestamp_millis(LISTED_AT + 5),
        ));
        claim_eq!(logger.logs[0], expected);
    }

    #[concordium_test]
    /// Settling before the deadline or for an unknown listing fails;
    /// settling twice fails with a distinct error.
    fn test_end_guards() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        expect_error(
            call_end(&mut host, BIDDER_A, 9, LISTED_AT + HOUR_MS),
            CustomContractError::UnknownListing.into(),
            "Settling an unknown listing should fail",
        );
        expect_error(
            call_end(&mut host, BIDDER_A, listing_id, LISTED_AT + HOUR_MS - 1),
            CustomContractError::NotExpired.into(),
            "Settling before the deadline should fail",
        );

        expect_nft_transfer_to(&mut host, SELLER);
        call_end(&mut host, BIDDER_A, listing_id, LISTED_AT + HOUR_MS)
            .expect("Settlement at the deadline should pass");

        expect_error(
            call_end(&mut host, BIDDER_A, listing_id, LISTED_AT + HOUR_MS + 1),
            CustomContractError::AlreadySettled.into(),
            "Settling a second time should fail",
        );
    }

    #[concordium_test]
    /// Settling a listing without bids returns the token to the seller
    /// and credits no one.
    fn test_end_without_bids() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        expect_nft_transfer_to(&mut host, SELLER);
        call_end(&mut host, BIDDER_A, listing_id, LISTED_AT + HOUR_MS)
            .expect("Settlement should pass");

        claim!(
            !host.state().in_custody(&token_0()),
            "Custody must be released on settlement"
        );
        claim_eq!(
            host.state().pending_return(&SELLER, listing_id),
            Amount::zero(),
            "No proceeds without bids"
        );
    }

    #[concordium_test]
    /// A sequence of bids, withdrawals and the one-shot settlement:
    /// 1. Listing with minimum price 10 and a one hour deadline.
    /// 2. A bids 15, B bids 17; A's former bid becomes refundable.
    /// 3. A withdraws 15; B withdraws nothing while leading.
    /// 4. A late bid of 10000 is rejected by the deadline alone.
    /// 5. Settlement hands the token to B and credits the seller 17.
    /// 6. A second settlement fails; the seller withdraws 17.
    fn test_auction_scenario() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        place_bid(&mut host, BIDDER_A, listing_id, 15, LISTED_AT + 1)
            .expect("First bid should pass");
        claim_eq!(
            get_listing(&host, listing_id).highest_bid,
            Amount::from_micro_ccd(15)
        );

        place_bid(&mut host, BIDDER_B, listing_id, 17, LISTED_AT + 2)
            .expect("Overbid should pass");
        claim_eq!(
            host.state().pending_return(&BIDDER_A, listing_id),
            Amount::from_micro_ccd(15),
            "Outbid bidder must be credited their former bid"
        );

        // A recovers the outbid funds, B stays locked in.
        host.set_self_balance(Amount::from_micro_ccd(15 + 17));
        call_withdraw(&mut host, BIDDER_A, LISTED_AT + 3).expect("Withdrawal should pass");
        claim_eq!(
            host.get_transfers(),
            [(BIDDER_A, Amount::from_micro_ccd(15))],
            "Outbid bidder receives exactly their former bid"
        );
        call_withdraw(&mut host, BIDDER_B, LISTED_AT + 4)
            .expect("Zero balance withdrawal should pass");
        claim_eq!(
            host.get_transfers().len(),
            1,
            "Leading bidder must not receive funds"
        );

        expect_error(
            place_bid(
                &mut host,
                BIDDER_A,
                listing_id,
                10_000,
                LISTED_AT + HOUR_MS + 1,
            ),
            CustomContractError::AuctionClosed.into(),
            "Bidding after the deadline should fail",
        );

        expect_nft_transfer_to(&mut host, BIDDER_B);
        call_end(&mut host, BIDDER_A, listing_id, LISTED_AT + HOUR_MS + 2)
            .expect("Settlement should pass");
        claim_eq!(
            host.state().pending_return(&SELLER, listing_id),
            Amount::from_micro_ccd(17),
            "Seller proceeds equal the winning bid"
        );

        expect_error(
            call_end(&mut host, SELLER, listing_id, LISTED_AT + HOUR_MS + 3),
            CustomContractError::AlreadySettled.into(),
            "Settling a second time should fail",
        );

        // The winner has nothing to withdraw, the seller collects.
        call_withdraw(&mut host, BIDDER_B, LISTED_AT + HOUR_MS + 4)
            .expect("Zero balance withdrawal should pass");
        claim_eq!(host.get_transfers().len(), 1);
        call_withdraw(&mut host, SELLER, LISTED_AT + HOUR_MS + 5)
            .expect("Seller withdrawal should pass");
        claim_eq!(
            host.get_transfers()[1],
            (SELLER, Amount::from_micro_ccd(17))
        );
    }

    #[concordium_test]
    /// Withdrawing with no refundable balance transfers nothing and
    /// succeeds.
    fn test_withdraw_zero_balance() {
        let mut host = new_host();
        host.set_self_balance(Amount::from_micro_ccd(100));

        call_withdraw(&mut host, BIDDER_A, LISTED_AT).expect("Withdrawal should pass");
        claim!(host.get_transfers().is_empty(), "No funds must move");
    }

    #[concordium_test]
    /// The view entrypoint reports the fields of an existing listing
    /// and rejects unknown ids.
    fn test_view() {
        let mut host = new_host();
        setup_nft(&mut host, SELLER, true);
        let listing_id = list_token(&mut host, SELLER, 10, 1).expect("Listing should pass");

        let parameter_bytes = to_bytes(&listing_id);
        let mut ctx = new_ctx(BIDDER_A, LISTED_AT + 1);
        ctx.set_parameter(&parameter_bytes);
        let result = view(&ctx, &host).expect("View should pass");
        claim_eq!(result.min_price, Amount::from_micro_ccd(10));

        let parameter_bytes = to_bytes(&9u64);
        let mut ctx = new_ctx(BIDDER_A, LISTED_AT + 1);
        ctx.set_parameter(&parameter_bytes);
        expect_error(
            view(&ctx, &host),
            CustomContractError::UnknownListing.into(),
            "Viewing an unknown listing should fail",
        );
    }
}
