//! Property Token
//!
//! Unique-token registry for deeded properties. Each token represents one
//! property and carries a metadata URI. Minting is restricted to addresses
//! the admin has authorized; transfers require the owner's auth or a
//! one-token approval, which is consumed on transfer.

#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, Address, Env, String,
};

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum TokenError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    TokenNotFound = 4,
    NotOwner = 5,
    NotApproved = 6,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Name,
    Symbol,
    Counter,
    Owner(u64),
    Approved(u64),
    Minter(Address),
    Uri(u64),
}

#[contract]
pub struct PropertyToken;

fn admin(e: &Env) -> Result<Address, TokenError> {
    e.storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(TokenError::NotInitialized)
}

fn owner(e: &Env, token_id: u64) -> Result<Address, TokenError> {
    e.storage()
        .persistent()
        .get(&DataKey::Owner(token_id))
        .ok_or(TokenError::TokenNotFound)
}

#[contractimpl]
impl PropertyToken {
    pub fn initialize(
        e: Env,
        admin: Address,
        name: String,
        symbol: String,
    ) -> Result<(), TokenError> {
        if e.storage().instance().has(&DataKey::Admin) {
            return Err(TokenError::AlreadyInitialized);
        }
        e.storage().instance().set(&DataKey::Admin, &admin);
        e.storage().instance().set(&DataKey::Name, &name);
        e.storage().instance().set(&DataKey::Symbol, &symbol);
        e.storage().instance().set(&DataKey::Counter, &0u64);
        Ok(())
    }

    pub fn set_authorized_minter(
        e: Env,
        minter: Address,
        authorized: bool,
    ) -> Result<(), TokenError> {
        let admin = admin(&e)?;
        admin.require_auth();
        if authorized {
            e.storage().persistent().set(&DataKey::Minter(minter), &true);
        } else {
            e.storage().persistent().remove(&DataKey::Minter(minter));
        }
        Ok(())
    }

    pub fn is_authorized_minter(e: Env, minter: Address) -> bool {
        e.storage()
            .persistent()
            .get(&DataKey::Minter(minter))
            .unwrap_or(false)
    }

    /// Mint the next sequential token to the minter. Ids start at 1.
    pub fn mint(e: Env, minter: Address, uri: String) -> Result<u64, TokenError> {
        minter.require_auth();
        let admin = admin(&e)?;
        if minter != admin && !Self::is_authorized_minter(e.clone(), minter.clone()) {
            return Err(TokenError::NotAuthorized);
        }

        let token_id: u64 = e
            .storage()
            .instance()
            .get(&DataKey::Counter)
            .unwrap_or(0u64)
            + 1;
        e.storage().instance().set(&DataKey::Counter, &token_id);
        e.storage()
            .persistent()
            .set(&DataKey::Owner(token_id), &minter);
        e.storage().persistent().set(&DataKey::Uri(token_id), &uri);

        e.events()
            .publish((symbol_short!("mint"), token_id), minter);
        Ok(token_id)
    }

    pub fn owner_of(e: Env, token_id: u64) -> Result<Address, TokenError> {
        owner(&e, token_id)
    }

    /// Approve one operator to transfer one token. Overwrites any prior
    /// approval for the token.
    pub fn approve(
        e: Env,
        owner: Address,
        operator: Address,
        token_id: u64,
    ) -> Result<(), TokenError> {
        owner.require_auth();
        let holder = self::owner(&e, token_id)?;
        if holder != owner {
            return Err(TokenError::NotOwner);
        }
        e.storage()
            .persistent()
            .set(&DataKey::Approved(token_id), &operator);
        e.events()
            .publish((symbol_short!("approve"), token_id), operator);
        Ok(())
    }

    pub fn get_approved(e: Env, token_id: u64) -> Option<Address> {
        e.storage().persistent().get(&DataKey::Approved(token_id))
    }

    pub fn transfer(e: Env, from: Address, to: Address, token_id: u64) -> Result<(), TokenError> {
        from.require_auth();
        let holder = owner(&e, token_id)?;
        if holder != from {
            return Err(TokenError::NotOwner);
        }
        Self::move_token(&e, &from, &to, token_id);
        Ok(())
    }

    /// Transfer on behalf of the owner. The spender must hold the token's
    /// approval; the approval is cleared by the transfer.
    pub fn transfer_from(
        e: Env,
        spender: Address,
        from: Address,
        to: Address,
        token_id: u64,
    ) -> Result<(), TokenError> {
        spender.require_auth();
        let holder = owner(&e, token_id)?;
        if holder != from {
            return Err(TokenError::NotOwner);
        }
        let approved: Option<Address> = e.storage().persistent().get(&DataKey::Approved(token_id));
        if approved != Some(spender) {
            return Err(TokenError::NotApproved);
        }
        Self::move_token(&e, &from, &to, token_id);
        Ok(())
    }

    pub fn token_uri(e: Env, token_id: u64) -> Result<String, TokenError> {
        e.storage()
            .persistent()
            .get(&DataKey::Uri(token_id))
            .ok_or(TokenError::TokenNotFound)
    }

    pub fn name(e: Env) -> Result<String, TokenError> {
        e.storage()
            .instance()
            .get(&DataKey::Name)
            .ok_or(TokenError::NotInitialized)
    }

    pub fn symbol(e: Env) -> Result<String, TokenError> {
        e.storage()
            .instance()
            .get(&DataKey::Symbol)
            .ok_or(TokenError::NotInitialized)
    }

    pub fn total_supply(e: Env) -> u64 {
        e.storage().instance().get(&DataKey::Counter).unwrap_or(0)
    }
}

impl PropertyToken {
    fn move_token(e: &Env, from: &Address, to: &Address, token_id: u64) {
        e.storage().persistent().set(&DataKey::Owner(token_id), to);
        e.storage().persistent().remove(&DataKey::Approved(token_id));
        e.events()
            .publish((symbol_short!("transfer"), token_id), (from.clone(), to.clone()));
    }
}
