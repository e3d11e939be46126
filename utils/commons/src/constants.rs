/// Tag for the Custom Listing event.
pub const LISTING_TAG: u8 = u8::MAX - 8;

/// Tag for the Custom Biding event.
pub const BIDING_TAG: u8 = u8::MAX - 11;
