use soroban_sdk::{symbol_short, Address, Env, Symbol, Vec};

use crate::types::{Approvals, Bid, DataKey, EscrowError, PropertySale, Role};

// Instance keys: contract-wide configuration.
fn k_admin() -> Symbol {
    symbol_short!("admin")
}
fn k_registry() -> Symbol {
    symbol_short!("registry")
}
fn k_token() -> Symbol {
    symbol_short!("token")
}
fn k_oracle() -> Symbol {
    symbol_short!("oracle")
}
fn k_seller() -> Symbol {
    symbol_short!("seller")
}
fn k_inspector() -> Symbol {
    symbol_short!("inspect")
}
fn k_lender() -> Symbol {
    symbol_short!("lender")
}
fn k_fee_recipient() -> Symbol {
    symbol_short!("fee_rcpt")
}
fn k_fee_bps() -> Symbol {
    symbol_short!("fee_bps")
}
fn k_paused() -> Symbol {
    symbol_short!("paused")
}
fn k_lock() -> Symbol {
    symbol_short!("lock")
}

pub fn has_admin(e: &Env) -> bool {
    e.storage().instance().has(&k_admin())
}

pub fn admin(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_admin())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_admin(e: &Env, admin: &Address) {
    e.storage().instance().set(&k_admin(), admin);
}

pub fn asset_registry(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_registry())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_asset_registry(e: &Env, registry: &Address) {
    e.storage().instance().set(&k_registry(), registry);
}

pub fn payment_token(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_token())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_payment_token(e: &Env, token: &Address) {
    e.storage().instance().set(&k_token(), token);
}

pub fn compliance_oracle(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_oracle())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_compliance_oracle(e: &Env, oracle: &Address) {
    e.storage().instance().set(&k_oracle(), oracle);
}

pub fn seller(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_seller())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_seller(e: &Env, seller: &Address) {
    e.storage().instance().set(&k_seller(), seller);
}

pub fn inspector(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_inspector())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_inspector(e: &Env, inspector: &Address) {
    e.storage().instance().set(&k_inspector(), inspector);
}

pub fn default_lender(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_lender())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_default_lender(e: &Env, lender: &Address) {
    e.storage().instance().set(&k_lender(), lender);
}

pub fn fee_recipient(e: &Env) -> Result<Address, EscrowError> {
    e.storage()
        .instance()
        .get(&k_fee_recipient())
        .ok_or(EscrowError::NotInitialized)
}

pub fn put_fee_recipient(e: &Env, recipient: &Address) {
    e.storage().instance().set(&k_fee_recipient(), recipient);
}

pub fn fee_bps(e: &Env) -> u32 {
    e.storage().instance().get(&k_fee_bps()).unwrap_or(0)
}

pub fn put_fee_bps(e: &Env, bps: u32) {
    e.storage().instance().set(&k_fee_bps(), &bps);
}

pub fn paused(e: &Env) -> bool {
    e.storage().instance().get(&k_paused()).unwrap_or(false)
}

pub fn put_paused(e: &Env, paused: bool) {
    e.storage().instance().set(&k_paused(), &paused);
}

// One lock for the whole call stack, not per property.
pub fn acquire_lock(e: &Env) -> Result<(), EscrowError> {
    let locked: bool = e.storage().instance().get(&k_lock()).unwrap_or(false);
    if locked {
        return Err(EscrowError::Reentrancy);
    }
    e.storage().instance().set(&k_lock(), &true);
    Ok(())
}

pub fn release_lock(e: &Env) {
    e.storage().instance().set(&k_lock(), &false);
}

// Persistent keys: per-property records.

pub fn try_get_sale(e: &Env, property_id: u64) -> Option<PropertySale> {
    e.storage().persistent().get(&DataKey::Sale(property_id))
}

pub fn get_sale(e: &Env, property_id: u64) -> Result<PropertySale, EscrowError> {
    try_get_sale(e, property_id).ok_or(EscrowError::PropertyNotFound)
}

pub fn put_sale(e: &Env, property_id: u64, sale: &PropertySale) {
    e.storage()
        .persistent()
        .set(&DataKey::Sale(property_id), sale);
}

pub fn approvals(e: &Env, property_id: u64) -> Approvals {
    e.storage()
        .persistent()
        .get(&DataKey::Approvals(property_id))
        .unwrap_or(Approvals {
            buyer: false,
            seller: false,
            lender: false,
        })
}

pub fn put_approvals(e: &Env, property_id: u64, approvals: &Approvals) {
    e.storage()
        .persistent()
        .set(&DataKey::Approvals(property_id), approvals);
}

pub fn clear_approvals(e: &Env, property_id: u64) {
    e.storage()
        .persistent()
        .remove(&DataKey::Approvals(property_id));
}

pub fn get_bid(e: &Env, property_id: u64, bidder: &Address) -> Option<Bid> {
    e.storage()
        .persistent()
        .get(&DataKey::Bid(property_id, bidder.clone()))
}

pub fn put_bid(e: &Env, property_id: u64, bidder: &Address, bid: &Bid) {
    e.storage()
        .persistent()
        .set(&DataKey::Bid(property_id, bidder.clone()), bid);
}

pub fn remove_bid(e: &Env, property_id: u64, bidder: &Address) {
    e.storage()
        .persistent()
        .remove(&DataKey::Bid(property_id, bidder.clone()));
}

pub fn bidders(e: &Env, property_id: u64) -> Vec<Address> {
    e.storage()
        .persistent()
        .get(&DataKey::Bidders(property_id))
        .unwrap_or(Vec::new(e))
}

pub fn put_bidders(e: &Env, property_id: u64, bidders: &Vec<Address>) {
    e.storage()
        .persistent()
        .set(&DataKey::Bidders(property_id), bidders);
}

pub fn add_bidder(e: &Env, property_id: u64, bidder: &Address) {
    let mut all = bidders(e, property_id);
    if !all.contains(bidder) {
        all.push_back(bidder.clone());
        put_bidders(e, property_id, &all);
    }
}

pub fn remove_bidder(e: &Env, property_id: u64, bidder: &Address) {
    let all = bidders(e, property_id);
    if let Some(pos) = all.first_index_of(bidder) {
        let mut all = all;
        all.remove(pos);
        put_bidders(e, property_id, &all);
    }
}

pub fn clear_bidders(e: &Env, property_id: u64) {
    e.storage()
        .persistent()
        .remove(&DataKey::Bidders(property_id));
}

pub fn has_role(e: &Env, account: &Address, role: Role) -> bool {
    e.storage()
        .persistent()
        .get(&DataKey::Role(account.clone(), role))
        .unwrap_or(false)
}

pub fn put_role(e: &Env, account: &Address, role: Role) {
    e.storage()
        .persistent()
        .set(&DataKey::Role(account.clone(), role), &true);
}

pub fn remove_role(e: &Env, account: &Address, role: Role) {
    e.storage()
        .persistent()
        .remove(&DataKey::Role(account.clone(), role));
}
