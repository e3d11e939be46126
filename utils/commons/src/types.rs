use super::*;

pub type ContractResult<A> = Result<A, ContractError>;

/// Contract token ID type.
pub type ContractTokenId = TokenIdVec;

/// Contract token amount type.
pub type ContractTokenAmount = TokenAmountU64;

/// Sequential identifier assigned to every listing, starting from
/// zero. Identifiers are never reused and listings are never deleted.
pub type ListingId = u64;

/// Wrapping the custom errors in a type with CIS2 errors.
pub type ContractError = Cis2Error<CustomContractError>;
