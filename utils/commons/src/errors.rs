use super::*;

/// The custom errors the contract can produce.
#[derive(Serialize, Debug, PartialEq, Eq, Reject)]
pub enum CustomContractError {
    /// Failed parsing the parameter (Error code: -1).
    #[from(ParseError)]
    ParseParams,
    /// Failed logging: Log is full (Error code: -2).
    LogFull,
    /// Failed logging: Log is malformed (Error code: -3).
    LogMalformed,
    /// Listing id is not known to the engine (Error code: -4).
    UnknownListing,
    /// Listing duration must be at least one hour (Error code: -5).
    InvalidDuration,
    /// Bid below the minimum price or not strictly above the current
    /// highest bid (Error code: -6).
    BidTooLow,
    /// Bid placed at or after the listing deadline (Error code: -7).
    AuctionClosed,
    /// Settlement attempted before the listing deadline (Error code: -8).
    NotExpired,
    /// Listing has already been settled (Error code: -9).
    AlreadySettled,
    /// Only account addresses can call this function (Error code: -10).
    OnlyAccountAddress,
    /// Only contract addresses can call this function (Error code: -11).
    ContractOnly,
    /// Transfers of anything other than a single token are not
    /// supported (Error code: -12).
    Unsupported,
    /// The NFT contract does not follow the expected interface
    /// (Error code: -13).
    Incompatible,
    /// Invoking the NFT contract failed (Error code: -14).
    InvokeContractError,
    /// Transferring CCD failed (Error code: -15).
    InvokeTransferError,
    /// Amount arithmetic overflowed (Error code: -16).
    Overflow,
}

/// Mapping the logging errors to CustomContractError.
impl From<LogError> for CustomContractError {
    fn from(le: LogError) -> Self {
        match le {
            LogError::Full => Self::LogFull,
            LogError::Malformed => Self::LogMalformed,
        }
    }
}

/// Mapping CustomContractError to ContractError.
impl From<CustomContractError> for ContractError {
    fn from(c: CustomContractError) -> Self {
        Cis2Error::Custom(c)
    }
}
