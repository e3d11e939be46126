//! An escrow backed English auction engine for CIS-2 NFTs.
//!
//! It exposes a function for listing an NFT for timed auction,
//! a function for bidding on a listing, a function for settling an
//! expired auction and a function for withdrawing refundable funds.
#![cfg_attr(not(feature = "std"), no_std)]

mod contract;
mod events;
mod external;
mod nft;
mod state;
