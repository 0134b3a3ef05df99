//! Escrow engine for tokenized property sales.
//!
//! Drives one property token through listing, buyer selection (fixed price
//! or auction), inspection, multi-party approval, optional lender financing
//! and final settlement. The contract holds the property token and all
//! buyer/bidder funds while a sale is open; every exit path (finalize,
//! cancel, emergency cancel) accounts for the full held amount before any
//! external transfer is made.

#![no_std]

mod storage;
mod types;

use soroban_sdk::{
    contract, contractclient, contractimpl, symbol_short, token, Address, BytesN, Env, String,
    Symbol, Vec,
};

pub use crate::types::{
    Approvals, Bid, DataKey, EscrowError, ListingConfig, ListingType, PaymentMethod,
    PropertySale, PropertyStatus, Role, SaleConditions,
};

/// Fee ceiling: 10%.
const MAX_FEE_BPS: u32 = 1_000;
const DEFAULT_FEE_BPS: u32 = 250;
const BPS_DENOMINATOR: i128 = 10_000;

/// A new bid must top a competing highest bid by at least this much.
const MIN_BID_INCREMENT: i128 = 1;

/// Asset-registry surface the engine drives: custody pull at listing time,
/// return on cancellation, transfer to the buyer at settlement.
#[contractclient(name = "RegistryClient")]
pub trait PropertyRegistry {
    fn owner_of(env: Env, token_id: u64) -> Address;
    fn get_approved(env: Env, token_id: u64) -> Option<Address>;
    fn transfer(env: Env, from: Address, to: Address, token_id: u64);
    fn transfer_from(env: Env, spender: Address, from: Address, to: Address, token_id: u64);
}

/// Compliance store consulted before funds or the asset move toward a buyer.
/// Writes normally arrive out-of-band; the escrow only forwards them for the
/// compliance role's convenience.
#[contractclient(name = "ComplianceClient")]
pub trait ComplianceGate {
    fn is_allowlisted(env: Env, account: Address) -> bool;
    fn has_credential(env: Env, account: Address) -> bool;
    fn get_unlock_at(env: Env, property_id: u64) -> u64;
    fn set_allowlist(env: Env, account: Address, allowed: bool);
    fn set_credential_hash(env: Env, account: Address, credential: BytesN<32>);
    fn set_unlock_at(env: Env, property_id: u64, unlock_at: u64);
}

#[contract]
pub struct Escrow;

#[contractimpl]
impl Escrow {
    /// One-time initializer. Records the collaborator contracts, the sale
    /// parties and the fee configuration. The platform fee starts at 250 bps.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        e: Env,
        admin: Address,
        asset_registry: Address,
        payment_token: Address,
        compliance_oracle: Address,
        seller: Address,
        inspector: Address,
        lender: Address,
        fee_recipient: Address,
    ) -> Result<(), EscrowError> {
        if storage::has_admin(&e) {
            return Err(EscrowError::AlreadyInitialized);
        }
        storage::put_admin(&e, &admin);
        storage::put_asset_registry(&e, &asset_registry);
        storage::put_payment_token(&e, &payment_token);
        storage::put_compliance_oracle(&e, &compliance_oracle);
        storage::put_seller(&e, &seller);
        storage::put_inspector(&e, &inspector);
        storage::put_default_lender(&e, &lender);
        storage::put_fee_recipient(&e, &fee_recipient);
        storage::put_fee_bps(&e, DEFAULT_FEE_BPS);
        storage::put_paused(&e, false);

        e.events().publish((symbol_short!("init"),), admin);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    /// List a property for sale. The caller must be the recognized seller
    /// (an admin may list on the seller's behalf; relisting a cancelled
    /// property is seller-only). The registry must already hold an approval
    /// for this contract; custody of the token is pulled in here.
    pub fn list(
        e: Env,
        caller: Address,
        property_id: u64,
        price: i128,
        escrow_amount: i128,
        config: ListingConfig,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;

        let seller = storage::seller(&e)?;
        if caller != seller && !Self::is_admin(&e, &caller)? {
            return Err(EscrowError::UnauthorizedCaller);
        }

        let prior_status = storage::try_get_sale(&e, property_id)
            .map(|sale| sale.status)
            .unwrap_or(PropertyStatus::NotListed);
        match prior_status {
            PropertyStatus::NotListed => {}
            PropertyStatus::Cancelled => {
                if caller != seller {
                    return Err(EscrowError::UnauthorizedCaller);
                }
            }
            _ => return Err(EscrowError::InvalidState),
        }

        if price <= 0 || escrow_amount < 0 || escrow_amount > price {
            return Err(EscrowError::InvalidConfiguration);
        }
        if config.conditions.listing_expiry <= Self::now(&e) {
            return Err(EscrowError::InvalidConfiguration);
        }

        let me = e.current_contract_address();
        let registry = Self::registry(&e)?;
        if registry.owner_of(&property_id) != seller {
            return Err(EscrowError::InvalidConfiguration);
        }
        if registry.get_approved(&property_id) != Some(me.clone()) {
            return Err(EscrowError::InvalidConfiguration);
        }
        registry.transfer_from(&me, &seller, &me, &property_id);

        let lender = match config.lender {
            Some(lender) => lender,
            None => storage::default_lender(&e)?,
        };
        let mut sale = PropertySale {
            price,
            escrow_amount,
            paid_amount: 0,
            current_buyer: None,
            lender,
            status: prior_status,
            listing_type: config.listing_type,
            payment_method: PaymentMethod::DirectPurchase,
            inspection_passed: false,
            conditions: config.conditions,
            listed_at: Self::now(&e),
            contract_signed_at: 0,
        };
        storage::clear_approvals(&e, property_id);
        Self::set_status(&e, property_id, &mut sale, PropertyStatus::Listed);
        storage::put_sale(&e, property_id, &sale);

        e.events().publish(
            (symbol_short!("listed"), property_id),
            (price, escrow_amount, sale.listing_type),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bidding (auction listings)
    // ------------------------------------------------------------------

    /// Place or replace a bid on an auction listing. `amount` is the
    /// bidder's total offered price; the collateral pulled is the full
    /// amount for a direct bid and exactly the earnest deposit for a
    /// deposit-and-lender bid. Replacing a bid settles only the collateral
    /// difference.
    pub fn place_bid(
        e: Env,
        bidder: Address,
        property_id: u64,
        amount: i128,
        method: PaymentMethod,
    ) -> Result<(), EscrowError> {
        bidder.require_auth();
        Self::require_not_paused(&e)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_place_bid(&e, &bidder, property_id, amount, method);
        storage::release_lock(&e);
        out
    }

    /// Withdraw the caller's bid, refunding exactly the collateral held.
    pub fn withdraw_bid(e: Env, bidder: Address, property_id: u64) -> Result<(), EscrowError> {
        bidder.require_auth();
        Self::require_not_paused(&e)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_withdraw_bid(&e, &bidder, property_id);
        storage::release_lock(&e);
        out
    }

    /// Seller accepts one bid. The sale re-prices to the accepted bid's
    /// amount, its collateral becomes the paid balance, and every other
    /// bidder is refunded. A refund an individual bidder refuses is logged
    /// and skipped rather than blocking the acceptance.
    pub fn accept_bid(
        e: Env,
        caller: Address,
        property_id: u64,
        bidder: Address,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;
        if caller != storage::seller(&e)? {
            return Err(EscrowError::UnauthorizedCaller);
        }
        storage::acquire_lock(&e)?;
        let out = Self::do_accept_bid(&e, property_id, &bidder);
        storage::release_lock(&e);
        out
    }

    // ------------------------------------------------------------------
    // Fixed-price purchase paths
    // ------------------------------------------------------------------

    /// Buy a fixed-price listing outright; pulls exactly the listing price.
    pub fn purchase_directly(e: Env, buyer: Address, property_id: u64) -> Result<(), EscrowError> {
        buyer.require_auth();
        Self::require_not_paused(&e)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_purchase(&e, &buyer, property_id, PaymentMethod::DirectPurchase);
        storage::release_lock(&e);
        out
    }

    /// Take a fixed-price listing under contract with an earnest deposit;
    /// the balance is expected from the lender.
    pub fn purchase_with_deposit(
        e: Env,
        buyer: Address,
        property_id: u64,
    ) -> Result<(), EscrowError> {
        buyer.require_auth();
        Self::require_not_paused(&e)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_purchase(&e, &buyer, property_id, PaymentMethod::DepositAndLender);
        storage::release_lock(&e);
        out
    }

    /// Compatibility alias for `purchase_with_deposit`.
    pub fn deposit_earnest(e: Env, buyer: Address, property_id: u64) -> Result<(), EscrowError> {
        Self::purchase_with_deposit(e, buyer, property_id)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Inspector records the inspection outcome. Valid until the inspection
    /// deadline, inclusive. A pass advances the sale; a failure parks it in
    /// `InspectionPending` where it may be retried or cancelled.
    pub fn update_inspection_status(
        e: Env,
        caller: Address,
        property_id: u64,
        passed: bool,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;
        if caller != storage::inspector(&e)? {
            return Err(EscrowError::UnauthorizedCaller);
        }

        let mut sale = storage::get_sale(&e, property_id)?;
        match sale.status {
            PropertyStatus::UnderContract | PropertyStatus::InspectionPending => {}
            _ => return Err(EscrowError::InvalidState),
        }
        let deadline = sale
            .contract_signed_at
            .saturating_add(sale.conditions.inspection_period);
        if Self::now(&e) > deadline {
            return Err(EscrowError::InspectionPeriodExpired);
        }

        sale.inspection_passed = passed;
        e.events()
            .publish((symbol_short!("inspect"), property_id), (passed, caller));

        if passed {
            Self::set_status(&e, property_id, &mut sale, PropertyStatus::AwaitingApprovals);
        } else if sale.status == PropertyStatus::UnderContract {
            Self::set_status(&e, property_id, &mut sale, PropertyStatus::InspectionPending);
        }
        storage::put_sale(&e, property_id, &sale);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Approvals and financing
    // ------------------------------------------------------------------

    /// Record the caller's approval. The caller must be the current buyer,
    /// the seller, or the property's lender; re-approving is a no-op. Once
    /// every required party has approved, the sale becomes ready to close.
    pub fn approve_sale(e: Env, caller: Address, property_id: u64) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;

        let mut sale = storage::get_sale(&e, property_id)?;
        if sale.status != PropertyStatus::AwaitingApprovals {
            return Err(EscrowError::InvalidState);
        }

        let mut approvals = storage::approvals(&e, property_id);
        let role: Symbol = if sale.current_buyer.as_ref() == Some(&caller) {
            approvals.buyer = true;
            symbol_short!("buyer")
        } else if caller == storage::seller(&e)? {
            approvals.seller = true;
            symbol_short!("seller")
        } else if caller == sale.lender {
            approvals.lender = true;
            symbol_short!("lender")
        } else {
            return Err(EscrowError::UnauthorizedCaller);
        };
        storage::put_approvals(&e, property_id, &approvals);
        e.events()
            .publish((symbol_short!("approved"), property_id), (caller, role));

        if Self::ready_to_close(&sale, &approvals) {
            Self::set_status(&e, property_id, &mut sale, PropertyStatus::ReadyToClose);
            storage::put_sale(&e, property_id, &sale);
        }
        Ok(())
    }

    /// Lender supplies the financed balance, exactly `price - escrow_amount`.
    /// Funding implies the lender's approval. The financing deadline is
    /// inclusive and only enforced when the listing requires financing.
    pub fn fund_by_lender(
        e: Env,
        caller: Address,
        property_id: u64,
        amount: i128,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;
        let sale = storage::get_sale(&e, property_id)?;
        if caller != sale.lender {
            return Err(EscrowError::UnauthorizedCaller);
        }
        storage::acquire_lock(&e)?;
        let out = Self::do_fund_by_lender(&e, property_id, amount);
        storage::release_lock(&e);
        out
    }

    // ------------------------------------------------------------------
    // Settlement and cancellation
    // ------------------------------------------------------------------

    /// Close the sale: re-check the buyer against the compliance oracle,
    /// take the platform fee, pay the seller the remainder and hand the
    /// property token to the buyer. The state flips to `Sold` before any
    /// transfer leaves the contract; a failing transfer reverts the call.
    pub fn finalize_sale(e: Env, caller: Address, property_id: u64) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;
        let seller = storage::seller(&e)?;
        if caller != seller {
            return Err(EscrowError::UnauthorizedCaller);
        }
        storage::acquire_lock(&e)?;
        let out = Self::do_finalize(&e, property_id, &seller);
        storage::release_lock(&e);
        out
    }

    /// Cancel an open sale. Buyer or seller only; the buyer's full paid
    /// balance is refunded, outstanding bids are returned and the token
    /// goes back to the seller.
    pub fn cancel_sale(
        e: Env,
        caller: Address,
        property_id: u64,
        reason: String,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_not_paused(&e)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_cancel_checked(&e, &caller, property_id, reason);
        storage::release_lock(&e);
        out
    }

    // ------------------------------------------------------------------
    // Emergency controls (usable while paused)
    // ------------------------------------------------------------------

    /// Force-cancel a sale, refunding the paid balance to an explicit
    /// recipient. Meant for stuck or compromised buyer addresses.
    pub fn emergency_cancel_sale(
        e: Env,
        caller: Address,
        property_id: u64,
        refund_recipient: Address,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Emergency)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_cancel(
            &e,
            property_id,
            Some(refund_recipient),
            String::from_str(&e, "emergency"),
        );
        storage::release_lock(&e);
        out
    }

    /// Sweep an arbitrary amount of the contract's token balance. Recovery
    /// hatch for funds stranded by failed refunds.
    pub fn emergency_withdraw(
        e: Env,
        caller: Address,
        recipient: Address,
        amount: i128,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Emergency)?;
        storage::acquire_lock(&e)?;
        let out = Self::do_emergency_withdraw(&e, &recipient, amount);
        storage::release_lock(&e);
        out
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn set_platform_fee(e: Env, caller: Address, fee_bps: u32) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Treasurer)?;
        if fee_bps > MAX_FEE_BPS {
            return Err(EscrowError::InvalidConfiguration);
        }
        storage::put_fee_bps(&e, fee_bps);
        e.events().publish((symbol_short!("fee_set"),), fee_bps);
        Ok(())
    }

    pub fn set_fee_recipient(
        e: Env,
        caller: Address,
        recipient: Address,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Treasurer)?;
        storage::put_fee_recipient(&e, &recipient);
        e.events().publish((symbol_short!("fee_rcpt"),), recipient);
        Ok(())
    }

    pub fn pause(e: Env, caller: Address) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Pauser)?;
        storage::put_paused(&e, true);
        e.events().publish((symbol_short!("paused"),), caller);
        Ok(())
    }

    pub fn unpause(e: Env, caller: Address) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Pauser)?;
        storage::put_paused(&e, false);
        e.events().publish((symbol_short!("unpaused"),), caller);
        Ok(())
    }

    pub fn set_inspector(e: Env, caller: Address, inspector: Address) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::InspectorAssign)?;
        storage::put_inspector(&e, &inspector);
        e.events().publish((symbol_short!("inspector"),), inspector);
        Ok(())
    }

    pub fn set_default_lender(e: Env, caller: Address, lender: Address) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::LenderAssign)?;
        storage::put_default_lender(&e, &lender);
        e.events().publish((symbol_short!("lender"),), lender);
        Ok(())
    }

    pub fn grant_role(
        e: Env,
        caller: Address,
        account: Address,
        role: Role,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        if !Self::is_admin(&e, &caller)? {
            return Err(EscrowError::UnauthorizedCaller);
        }
        storage::put_role(&e, &account, role);
        e.events()
            .publish((symbol_short!("role_set"),), (account, role));
        Ok(())
    }

    pub fn revoke_role(
        e: Env,
        caller: Address,
        account: Address,
        role: Role,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        if !Self::is_admin(&e, &caller)? {
            return Err(EscrowError::UnauthorizedCaller);
        }
        storage::remove_role(&e, &account, role);
        e.events()
            .publish((symbol_short!("role_rm"),), (account, role));
        Ok(())
    }

    pub fn has_role(e: Env, account: Address, role: Role) -> bool {
        storage::has_role(&e, &account, role)
    }

    // Compliance convenience forwarders. The oracle's writes normally come
    // from the off-chain verification pipeline; these let the compliance
    // role drive the same store through the escrow.

    pub fn set_allowlist(
        e: Env,
        caller: Address,
        account: Address,
        allowed: bool,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Compliance)?;
        Self::oracle(&e)?.set_allowlist(&account, &allowed);
        Ok(())
    }

    pub fn set_credential_hash(
        e: Env,
        caller: Address,
        account: Address,
        credential: BytesN<32>,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Compliance)?;
        Self::oracle(&e)?.set_credential_hash(&account, &credential);
        Ok(())
    }

    pub fn set_unlock_at(
        e: Env,
        caller: Address,
        property_id: u64,
        unlock_at: u64,
    ) -> Result<(), EscrowError> {
        caller.require_auth();
        Self::require_role(&e, &caller, Role::Compliance)?;
        Self::oracle(&e)?.set_unlock_at(&property_id, &unlock_at);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn get_property(e: Env, property_id: u64) -> Result<PropertySale, EscrowError> {
        storage::get_sale(&e, property_id)
    }

    pub fn get_approval_status(e: Env, property_id: u64) -> Approvals {
        storage::approvals(&e, property_id)
    }

    pub fn get_bid(e: Env, property_id: u64, bidder: Address) -> Option<Bid> {
        storage::get_bid(&e, property_id, &bidder)
    }

    /// The bidder's declared bid amount; zero when no bid is active.
    pub fn get_bid_amount(e: Env, property_id: u64, bidder: Address) -> i128 {
        storage::get_bid(&e, property_id, &bidder)
            .map(|bid| bid.amount)
            .unwrap_or(0)
    }

    pub fn get_bidders(e: Env, property_id: u64) -> Vec<Address> {
        storage::bidders(&e, property_id)
    }

    pub fn get_highest_bid(e: Env, property_id: u64) -> Option<(Address, i128)> {
        let (bidder, amount) = Self::highest_bid_excluding(&e, property_id, None);
        bidder.map(|bidder| (bidder, amount))
    }

    /// Funds the contract holds for this property: paid balance plus all
    /// outstanding bid collateral.
    pub fn get_property_balance(e: Env, property_id: u64) -> Result<i128, EscrowError> {
        let sale = storage::get_sale(&e, property_id)?;
        let mut total = sale.paid_amount;
        for bidder in storage::bidders(&e, property_id).iter() {
            if let Some(bid) = storage::get_bid(&e, property_id, &bidder) {
                total += bid.collateral;
            }
        }
        Ok(total)
    }

    pub fn get_balance(e: Env) -> Result<i128, EscrowError> {
        Ok(Self::payments(&e)?.balance(&e.current_contract_address()))
    }

    pub fn is_listing_expired(e: Env, property_id: u64) -> Result<bool, EscrowError> {
        let sale = storage::get_sale(&e, property_id)?;
        Ok(Self::now(&e) > sale.conditions.listing_expiry)
    }

    pub fn platform_fee(e: Env) -> u32 {
        storage::fee_bps(&e)
    }

    pub fn fee_recipient(e: Env) -> Result<Address, EscrowError> {
        storage::fee_recipient(&e)
    }

    pub fn seller(e: Env) -> Result<Address, EscrowError> {
        storage::seller(&e)
    }

    pub fn inspector(e: Env) -> Result<Address, EscrowError> {
        storage::inspector(&e)
    }

    pub fn default_lender(e: Env) -> Result<Address, EscrowError> {
        storage::default_lender(&e)
    }

    pub fn asset_registry(e: Env) -> Result<Address, EscrowError> {
        storage::asset_registry(&e)
    }

    pub fn payment_token(e: Env) -> Result<Address, EscrowError> {
        storage::payment_token(&e)
    }

    pub fn compliance_oracle(e: Env) -> Result<Address, EscrowError> {
        storage::compliance_oracle(&e)
    }

    pub fn is_paused(e: Env) -> bool {
        storage::paused(&e)
    }
}

impl Escrow {
    fn now(e: &Env) -> u64 {
        e.ledger().timestamp()
    }

    fn require_not_paused(e: &Env) -> Result<(), EscrowError> {
        if storage::paused(e) {
            return Err(EscrowError::ContractPaused);
        }
        Ok(())
    }

    fn is_admin(e: &Env, account: &Address) -> Result<bool, EscrowError> {
        Ok(*account == storage::admin(e)? || storage::has_role(e, account, Role::Admin))
    }

    fn require_role(e: &Env, caller: &Address, role: Role) -> Result<(), EscrowError> {
        if Self::is_admin(e, caller)? || storage::has_role(e, caller, role) {
            Ok(())
        } else {
            Err(EscrowError::UnauthorizedCaller)
        }
    }

    fn payments<'a>(e: &'a Env) -> Result<token::Client<'a>, EscrowError> {
        Ok(token::Client::new(e, &storage::payment_token(e)?))
    }

    fn registry<'a>(e: &'a Env) -> Result<RegistryClient<'a>, EscrowError> {
        Ok(RegistryClient::new(e, &storage::asset_registry(e)?))
    }

    fn oracle<'a>(e: &'a Env) -> Result<ComplianceClient<'a>, EscrowError> {
        Ok(ComplianceClient::new(e, &storage::compliance_oracle(e)?))
    }

    fn set_status(e: &Env, property_id: u64, sale: &mut PropertySale, next: PropertyStatus) {
        let prev = sale.status;
        sale.status = next;
        e.events()
            .publish((symbol_short!("status"), property_id), (prev, next));
    }

    /// Sale parties other than the buyer are vetted off-chain; they skip the
    /// early compliance check. The buyer is always re-checked at finalize.
    fn is_privileged(e: &Env, sale: &PropertySale, account: &Address) -> Result<bool, EscrowError> {
        Ok(*account == storage::seller(e)?
            || *account == storage::inspector(e)?
            || *account == sale.lender
            || Self::is_admin(e, account)?)
    }

    fn check_kyc(e: &Env, sale: &PropertySale, account: &Address) -> Result<(), EscrowError> {
        if Self::is_privileged(e, sale, account)? {
            return Ok(());
        }
        let oracle = Self::oracle(e)?;
        if !oracle.is_allowlisted(account) {
            return Err(EscrowError::TransferNotAllowed);
        }
        if !oracle.has_credential(account) {
            return Err(EscrowError::MissingCredential);
        }
        Ok(())
    }

    fn ready_to_close(sale: &PropertySale, approvals: &Approvals) -> bool {
        approvals.buyer
            && approvals.seller
            && (sale.payment_method == PaymentMethod::DirectPurchase || approvals.lender)
    }

    /// Buyer selected: stamp the contract time and enter `UnderContract`,
    /// skipping straight to approvals when no inspection is required.
    fn enter_contract(e: &Env, property_id: u64, sale: &mut PropertySale) {
        sale.contract_signed_at = Self::now(e);
        Self::set_status(e, property_id, sale, PropertyStatus::UnderContract);
        if !sale.conditions.requires_inspection {
            Self::set_status(e, property_id, sale, PropertyStatus::AwaitingApprovals);
        }
    }

    fn highest_bid_excluding(
        e: &Env,
        property_id: u64,
        exclude: Option<&Address>,
    ) -> (Option<Address>, i128) {
        let mut best: Option<Address> = None;
        let mut best_amount: i128 = 0;
        for bidder in storage::bidders(e, property_id).iter() {
            if exclude == Some(&bidder) {
                continue;
            }
            if let Some(bid) = storage::get_bid(e, property_id, &bidder) {
                if bid.amount > best_amount {
                    best_amount = bid.amount;
                    best = Some(bidder);
                }
            }
        }
        (best, best_amount)
    }

    /// Refund every outstanding bid, zeroing each ledger entry before its
    /// transfer. A transfer an individual bidder refuses is surfaced as an
    /// `rf_fail` event and skipped; the stranded amount stays recoverable
    /// through `emergency_withdraw`.
    fn refund_outstanding_bids(e: &Env, property_id: u64) -> Result<(), EscrowError> {
        let all = storage::bidders(e, property_id);
        if all.is_empty() {
            return Ok(());
        }
        let payments = Self::payments(e)?;
        let me = e.current_contract_address();
        storage::clear_bidders(e, property_id);
        for bidder in all.iter() {
            if let Some(bid) = storage::get_bid(e, property_id, &bidder) {
                storage::remove_bid(e, property_id, &bidder);
                if bid.collateral > 0
                    && payments.try_transfer(&me, &bidder, &bid.collateral).is_err()
                {
                    e.events().publish(
                        (symbol_short!("rf_fail"), property_id),
                        (bidder.clone(), bid.collateral),
                    );
                }
            }
        }
        Ok(())
    }

    fn do_place_bid(
        e: &Env,
        bidder: &Address,
        property_id: u64,
        amount: i128,
        method: PaymentMethod,
    ) -> Result<(), EscrowError> {
        let sale = storage::get_sale(e, property_id)?;
        if sale.status != PropertyStatus::Listed || sale.listing_type != ListingType::Auction {
            return Err(EscrowError::InvalidState);
        }
        if Self::now(e) > sale.conditions.listing_expiry {
            return Err(EscrowError::ListingExpired);
        }
        Self::check_kyc(e, &sale, bidder)?;
        if amount < sale.price {
            return Err(EscrowError::InsufficientValue);
        }
        let (top_bidder, top_amount) = Self::highest_bid_excluding(e, property_id, Some(bidder));
        if top_bidder.is_some() && amount < top_amount + MIN_BID_INCREMENT {
            return Err(EscrowError::InsufficientValue);
        }

        let collateral = match method {
            PaymentMethod::DirectPurchase => amount,
            PaymentMethod::DepositAndLender => sale.escrow_amount,
        };
        let held = storage::get_bid(e, property_id, bidder)
            .map(|bid| bid.collateral)
            .unwrap_or(0);

        storage::put_bid(
            e,
            property_id,
            bidder,
            &Bid {
                amount,
                collateral,
                method,
            },
        );
        storage::add_bidder(e, property_id, bidder);

        let payments = Self::payments(e)?;
        let me = e.current_contract_address();
        if collateral > held {
            payments.transfer(bidder, &me, &(collateral - held));
        } else if collateral < held {
            payments.transfer(&me, bidder, &(held - collateral));
        }

        e.events().publish(
            (symbol_short!("bid"), property_id),
            (bidder.clone(), amount, method),
        );
        Ok(())
    }

    fn do_withdraw_bid(e: &Env, bidder: &Address, property_id: u64) -> Result<(), EscrowError> {
        let bid = storage::get_bid(e, property_id, bidder).ok_or(EscrowError::BidNotFound)?;
        storage::remove_bid(e, property_id, bidder);
        storage::remove_bidder(e, property_id, bidder);

        if bid.collateral > 0 {
            Self::payments(e)?.transfer(&e.current_contract_address(), bidder, &bid.collateral);
        }
        e.events().publish(
            (symbol_short!("bid_wd"), property_id),
            (bidder.clone(), bid.collateral),
        );
        Ok(())
    }

    fn do_accept_bid(e: &Env, property_id: u64, bidder: &Address) -> Result<(), EscrowError> {
        let mut sale = storage::get_sale(e, property_id)?;
        if sale.status != PropertyStatus::Listed || sale.listing_type != ListingType::Auction {
            return Err(EscrowError::InvalidState);
        }
        let bid = storage::get_bid(e, property_id, bidder).ok_or(EscrowError::BidNotFound)?;
        storage::remove_bid(e, property_id, bidder);
        storage::remove_bidder(e, property_id, bidder);

        sale.current_buyer = Some(bidder.clone());
        sale.payment_method = bid.method;
        sale.price = bid.amount;
        sale.paid_amount = bid.collateral;
        Self::enter_contract(e, property_id, &mut sale);
        storage::put_sale(e, property_id, &sale);

        Self::refund_outstanding_bids(e, property_id)?;

        e.events()
            .publish((symbol_short!("bid_acc"), property_id), bidder.clone());
        Ok(())
    }

    fn do_purchase(
        e: &Env,
        buyer: &Address,
        property_id: u64,
        method: PaymentMethod,
    ) -> Result<(), EscrowError> {
        let mut sale = storage::get_sale(e, property_id)?;
        if sale.status != PropertyStatus::Listed || sale.listing_type != ListingType::FixedPrice {
            return Err(EscrowError::InvalidState);
        }
        if Self::now(e) > sale.conditions.listing_expiry {
            return Err(EscrowError::ListingExpired);
        }
        Self::check_kyc(e, &sale, buyer)?;

        let amount = match method {
            PaymentMethod::DirectPurchase => sale.price,
            PaymentMethod::DepositAndLender => sale.escrow_amount,
        };
        Self::payments(e)?.transfer(buyer, &e.current_contract_address(), &amount);

        sale.current_buyer = Some(buyer.clone());
        sale.payment_method = method;
        sale.paid_amount = amount;
        e.events().publish(
            (symbol_short!("deposit"), property_id),
            (buyer.clone(), amount),
        );
        Self::enter_contract(e, property_id, &mut sale);
        storage::put_sale(e, property_id, &sale);
        Ok(())
    }

    fn do_fund_by_lender(e: &Env, property_id: u64, amount: i128) -> Result<(), EscrowError> {
        let mut sale = storage::get_sale(e, property_id)?;
        if sale.payment_method != PaymentMethod::DepositAndLender {
            return Err(EscrowError::InvalidState);
        }
        if sale.status != PropertyStatus::AwaitingApprovals {
            return Err(EscrowError::InvalidState);
        }
        if sale.conditions.requires_financing {
            let deadline = sale
                .contract_signed_at
                .saturating_add(sale.conditions.financing_period);
            if Self::now(e) > deadline {
                return Err(EscrowError::FinancingPeriodExpired);
            }
        }
        if amount != sale.price - sale.escrow_amount {
            return Err(EscrowError::IncorrectValue);
        }
        if sale.paid_amount + amount > sale.price {
            return Err(EscrowError::InvalidState);
        }

        Self::payments(e)?.transfer(&sale.lender, &e.current_contract_address(), &amount);
        sale.paid_amount += amount;

        let mut approvals = storage::approvals(e, property_id);
        approvals.lender = true;
        storage::put_approvals(e, property_id, &approvals);

        e.events().publish(
            (symbol_short!("funded"), property_id),
            (sale.lender.clone(), amount),
        );

        if Self::ready_to_close(&sale, &approvals) {
            Self::set_status(e, property_id, &mut sale, PropertyStatus::ReadyToClose);
        }
        storage::put_sale(e, property_id, &sale);
        Ok(())
    }

    fn do_finalize(e: &Env, property_id: u64, seller: &Address) -> Result<(), EscrowError> {
        let mut sale = storage::get_sale(e, property_id)?;
        if sale.status != PropertyStatus::ReadyToClose {
            return Err(EscrowError::InvalidState);
        }
        let buyer = sale
            .current_buyer
            .clone()
            .ok_or(EscrowError::InvalidState)?;

        let oracle = Self::oracle(e)?;
        if !oracle.is_allowlisted(&buyer) {
            return Err(EscrowError::TransferNotAllowed);
        }
        if !oracle.has_credential(&buyer) {
            return Err(EscrowError::MissingCredential);
        }
        if Self::now(e) < oracle.get_unlock_at(&property_id) {
            return Err(EscrowError::LockupActive);
        }
        if sale.paid_amount != sale.price {
            return Err(EscrowError::InsufficientValue);
        }

        let total_paid = sale.paid_amount;
        let fee = sale.price * (storage::fee_bps(e) as i128) / BPS_DENOMINATOR;
        sale.paid_amount = 0;
        storage::clear_approvals(e, property_id);
        Self::set_status(e, property_id, &mut sale, PropertyStatus::Sold);
        storage::put_sale(e, property_id, &sale);

        let payments = Self::payments(e)?;
        let me = e.current_contract_address();
        if fee > 0 {
            payments.transfer(&me, &storage::fee_recipient(e)?, &fee);
        }
        payments.transfer(&me, seller, &(sale.price - fee));
        Self::registry(e)?.transfer(&me, &buyer, &property_id);

        e.events()
            .publish((symbol_short!("final"), property_id), (buyer, total_paid));
        Ok(())
    }

    fn do_cancel_checked(
        e: &Env,
        caller: &Address,
        property_id: u64,
        reason: String,
    ) -> Result<(), EscrowError> {
        let sale = storage::get_sale(e, property_id)?;
        let is_buyer = sale.current_buyer.as_ref() == Some(caller);
        if !is_buyer && *caller != storage::seller(e)? {
            return Err(EscrowError::UnauthorizedCaller);
        }
        Self::do_cancel(e, property_id, None, reason)
    }

    /// Shared cancellation path. The buyer's refund (or the explicit
    /// emergency recipient's) is part of the primary action and aborts the
    /// call on failure; bidder refunds are isolated per bidder.
    fn do_cancel(
        e: &Env,
        property_id: u64,
        refund_to: Option<Address>,
        reason: String,
    ) -> Result<(), EscrowError> {
        let mut sale = storage::get_sale(e, property_id)?;
        match sale.status {
            PropertyStatus::Listed
            | PropertyStatus::UnderContract
            | PropertyStatus::InspectionPending
            | PropertyStatus::AwaitingApprovals => {}
            _ => return Err(EscrowError::InvalidState),
        }

        let refund_amount = sale.paid_amount;
        let recipient = refund_to.or_else(|| sale.current_buyer.clone());
        sale.paid_amount = 0;
        sale.current_buyer = None;
        sale.inspection_passed = false;
        storage::clear_approvals(e, property_id);
        Self::set_status(e, property_id, &mut sale, PropertyStatus::Cancelled);
        storage::put_sale(e, property_id, &sale);

        Self::refund_outstanding_bids(e, property_id)?;

        let me = e.current_contract_address();
        if refund_amount > 0 {
            if let Some(recipient) = recipient {
                Self::payments(e)?.transfer(&me, &recipient, &refund_amount);
            }
        }
        Self::registry(e)?.transfer(&me, &storage::seller(e)?, &property_id);

        e.events()
            .publish((symbol_short!("cancel"), property_id), reason);
        Ok(())
    }

    fn do_emergency_withdraw(
        e: &Env,
        recipient: &Address,
        amount: i128,
    ) -> Result<(), EscrowError> {
        if amount <= 0 {
            return Err(EscrowError::IncorrectValue);
        }
        Self::payments(e)?.transfer(&e.current_contract_address(), recipient, &amount);
        e.events()
            .publish((symbol_short!("emg_wd"),), (recipient.clone(), amount));
        Ok(())
    }
}
