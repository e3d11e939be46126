use super::*;

/// A single NFT unit: the issuing contract together with the token
/// identifier inside it.
#[derive(Debug, Serialize, SchemaType, Clone, PartialEq, Eq)]
pub struct Token {
    /// NFT contract address.
    pub contract: ContractAddress,
    /// NFT token identifier.
    pub id: ContractTokenId,
}
