use commons::{
    ContractError, ContractResult, ContractTokenAmount, ContractTokenId, CustomContractError, Token,
};
use concordium_cis2::{
    AdditionalData, BalanceOfQuery, BalanceOfQueryParams, BalanceOfQueryResponse, OperatorOfQuery,
    OperatorOfQueryParams, OperatorOfQueryResponse, Receiver, Transfer, TransferParams,
};
use concordium_std::*;

/// Entrypoint on this contract that NFT contracts invoke to hand over
/// custody of a transferred token.
pub const ON_RECEIVING_ENTRYPOINT: &str = "onReceivingCis2";

/// Query how many units of the token `owner` holds on the NFT
/// contract.
pub fn balance_of<T>(
    host: &impl HasHost<T>,
    token: &Token,
    owner: AccountAddress,
) -> ContractResult<ContractTokenAmount> {
    let params = BalanceOfQueryParams {
        queries: vec![BalanceOfQuery {
            token_id: token.id.clone(),
            address: Address::Account(owner),
        }],
    };

    let mut response = host
        .invoke_contract_read_only(
            &token.contract,
            &params,
            EntrypointName::new_unchecked("balanceOf"),
            Amount::zero(),
        )
        .map_err(handle_call_error)?
        .ok_or(CustomContractError::Incompatible)?;

    let response = BalanceOfQueryResponse::<ContractTokenAmount>::deserial(&mut response)
        .map_err(|_| CustomContractError::Incompatible)?;

    response
        .0
        .first()
        .copied()
        .ok_or_else(|| CustomContractError::Incompatible.into())
}

/// Query whether `operator` is an approved operator of `owner` on the
/// NFT contract.
pub fn is_operator<T>(
    host: &impl HasHost<T>,
    contract: &ContractAddress,
    owner: AccountAddress,
    operator: ContractAddress,
) -> ContractResult<bool> {
    let params = OperatorOfQueryParams {
        queries: vec![OperatorOfQuery {
            owner: Address::Account(owner),
            address: Address::Contract(operator),
        }],
    };

    let mut response = host
        .invoke_contract_read_only(
            contract,
            &params,
            EntrypointName::new_unchecked("operatorOf"),
            Amount::zero(),
        )
        .map_err(handle_call_error)?
        .ok_or(CustomContractError::Incompatible)?;

    let response = OperatorOfQueryResponse::deserial(&mut response)
        .map_err(|_| CustomContractError::Incompatible)?;

    response
        .0
        .first()
        .copied()
        .ok_or_else(|| CustomContractError::Incompatible.into())
}

/// Pull the token from the seller into the engine's custody. The NFT
/// contract invokes the acceptance hook on this contract synchronously
/// during the call.
pub fn transfer_to_self<T>(
    host: &mut impl HasHost<T>,
    token: Token,
    from: AccountAddress,
    self_address: ContractAddress,
) -> ContractResult<()> {
    transfer(
        host,
        token,
        Address::Account(from),
        Receiver::Contract(
            self_address,
            OwnedEntrypointName::new_unchecked(ON_RECEIVING_ENTRYPOINT.into()),
        ),
    )
}

/// Transfer a token out of the engine's custody to `to`.
pub fn transfer_from_self<T>(
    host: &mut impl HasHost<T>,
    token: Token,
    self_address: ContractAddress,
    to: AccountAddress,
) -> ContractResult<()> {
    transfer(
        host,
        token,
        Address::Contract(self_address),
        Receiver::Account(to),
    )
}

fn transfer<T>(
    host: &mut impl HasHost<T>,
    token: Token,
    from: Address,
    to: Receiver,
) -> ContractResult<()> {
    let params = TransferParams(vec![Transfer {
        token_id: token.id,
        amount: ContractTokenAmount::from(1),
        from,
        to,
        data: AdditionalData::empty(),
    }]);

    host.invoke_contract(
        &token.contract,
        &params,
        EntrypointName::new_unchecked("transfer"),
        Amount::zero(),
    )
    .map_err(handle_call_error)?;

    Ok(())
}

fn handle_call_error<R>(error: CallContractError<R>) -> ContractError {
    match error {
        CallContractError::MissingEntrypoint
        | CallContractError::MessageFailed
        | CallContractError::MissingContract => CustomContractError::Incompatible.into(),
        CallContractError::LogicReject { .. } => CustomContractError::InvokeContractError.into(),
        CallContractError::AmountTooLarge
        | CallContractError::MissingAccount
        | CallContractError::Trap => CustomContractError::InvokeContractError.into(),
    }
}

#[concordium_cfg_test]
mod tests {
    use concordium_cis2::TokenIdVec;
    use concordium_std::test_infrastructure::*;

    use super::*;

    const NFT_CONTRACT: ContractAddress = ContractAddress {
        index: 1,
        subindex: 0,
    };

    const ENGINE: ContractAddress = ContractAddress {
        index: 5,
        subindex: 0,
    };

    const USER_1: AccountAddress = AccountAddress([1; 32]);

    fn token_1() -> Token {
        Token {
            contract: NFT_CONTRACT,
            id: TokenIdVec(vec![1]),
        }
    }

    #[concordium_test]
    fn test_transfer_from_self() {
        let state = ();
        let state_builder = TestStateBuilder::new();
        let mut host = TestHost::new(state, state_builder);

        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            MockFn::new_v1(|param, _, _, _| {
                let params = TransferParams::<ContractTokenId, ContractTokenAmount>::deserial(
                    &mut Cursor::new(param.as_ref()),
                )
                .map_err(|_| CallContractError::Trap)?;
                for transfer in params.0 {
                    match transfer.to {
                        Receiver::Account(account) if account == USER_1 => (),
                        _ => return Err(CallContractError::Trap),
                    }
                }
                Ok((true, ()))
            }),
        );

        let response = transfer_from_self(&mut host, token_1(), ENGINE, USER_1);

        claim_eq!(response, Ok(()));
    }

    #[concordium_test]
    fn test_balance_of() {
        let state = ();
        let state_builder = TestStateBuilder::new();
        let mut host = TestHost::new(state, state_builder);

        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("balanceOf".into()),
            MockFn::new_v1(|param, _, _, _| {
                let params = BalanceOfQueryParams::<ContractTokenId>::deserial(&mut Cursor::new(
                    param.as_ref(),
                ))
                .map_err(|_| CallContractError::Trap)?;

                let response: Vec<ContractTokenAmount> = params
                    .queries
                    .iter()
                    .map(|query| {
                        if query.address == Address::Account(USER_1) {
                            ContractTokenAmount::from(1)
                        } else {
                            ContractTokenAmount::from(0)
                        }
                    })
                    .collect();

                Ok((false, BalanceOfQueryResponse::from(response)))
            }),
        );

        let response = balance_of(&host, &token_1(), USER_1);

        claim_eq!(response, Ok(ContractTokenAmount::from(1)));
    }

    #[concordium_test]
    fn test_is_operator() {
        let state = ();
        let state_builder = TestStateBuilder::new();
        let mut host = TestHost::new(state, state_builder);

        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked("operatorOf".into()),
            MockFn::new_v1(|param, _, _, _| {
                let params =
                    OperatorOfQueryParams::deserial(&mut Cursor::new(param.as_ref()))
                        .map_err(|_| CallContractError::Trap)?;

                let response: Vec<bool> = params
                    .queries
                    .iter()
                    .map(|query| query.address == Address::Contract(ENGINE))
                    .collect();

                Ok((false, OperatorOfQueryResponse::from(response)))
            }),
        );

        let response = is_operator(&host, &NFT_CONTRACT, USER_1, ENGINE);

        claim_eq!(response, Ok(true));
    }
}
