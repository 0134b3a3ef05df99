use soroban_sdk::{contracterror, contracttype, Address};

/// Lifecycle of a property sale. `Sold` and `Cancelled` are terminal, except
/// that a cancelled property may be relisted by the seller.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PropertyStatus {
    NotListed = 0,
    Listed = 1,
    UnderContract = 2,
    InspectionPending = 3,
    AwaitingApprovals = 4,
    ReadyToClose = 5,
    Sold = 6,
    Cancelled = 7,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListingType {
    FixedPrice = 0,
    Auction = 1,
}

/// How the buyer supplies the purchase price: everything up front, or an
/// earnest deposit topped up by lender financing.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PaymentMethod {
    DirectPurchase = 0,
    DepositAndLender = 1,
}

/// Immutable-after-listing sale terms. Periods are in seconds, measured from
/// the moment a buyer is selected; both deadlines are inclusive.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SaleConditions {
    pub inspection_period: u64,
    pub financing_period: u64,
    pub requires_inspection: bool,
    pub requires_financing: bool,
    pub listing_expiry: u64,
}

/// Listing parameters beyond price and deposit. `lender: None` falls back to
/// the contract-wide default lender.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListingConfig {
    pub listing_type: ListingType,
    pub conditions: SaleConditions,
    pub lender: Option<Address>,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertySale {
    pub price: i128,
    pub escrow_amount: i128,
    pub paid_amount: i128,
    pub current_buyer: Option<Address>,
    pub lender: Address,
    pub status: PropertyStatus,
    pub listing_type: ListingType,
    pub payment_method: PaymentMethod,
    pub inspection_passed: bool,
    pub conditions: SaleConditions,
    pub listed_at: u64,
    pub contract_signed_at: u64,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Approvals {
    pub buyer: bool,
    pub seller: bool,
    pub lender: bool,
}

/// One auction bid. `amount` is the bidder's declared total price;
/// `collateral` is what the contract actually holds for it (the full amount
/// for direct bids, the earnest deposit for deposit-and-lender bids).
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bid {
    pub amount: i128,
    pub collateral: i128,
    pub method: PaymentMethod,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Admin = 0,
    Pauser = 1,
    Treasurer = 2,
    Emergency = 3,
    Compliance = 4,
    InspectorAssign = 5,
    LenderAssign = 6,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Sale(u64),
    Approvals(u64),
    Bid(u64, Address),
    Bidders(u64),
    Role(Address, Role),
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum EscrowError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    UnauthorizedCaller = 3,
    InvalidState = 4,
    InvalidConfiguration = 5,
    ListingExpired = 6,
    InspectionPeriodExpired = 7,
    FinancingPeriodExpired = 8,
    TransferNotAllowed = 9,
    MissingCredential = 10,
    LockupActive = 11,
    InsufficientValue = 12,
    IncorrectValue = 13,
    PropertyNotFound = 14,
    BidNotFound = 15,
    ContractPaused = 16,
    Reentrancy = 17,
}
