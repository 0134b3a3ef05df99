//! Compliance Oracle
//!
//! Read store consulted by the escrow before settlement: per-account
//! allowlist flag and KYC credential hash, per-property transfer-unlock
//! timestamp. Writes are admin-gated and normally arrive out-of-band from
//! the identity-verification pipeline. A document-hash registry (deed,
//! inspection report, disclosure) rides along for record keeping; it gates
//! nothing.

#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, Address, BytesN, Env,
};

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum OracleError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocType {
    Deed = 0,
    InspectionReport = 1,
    Disclosure = 2,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Allow(Address),
    Cred(Address),
    Unlock(u64),
    Doc(u64, DocType),
}

#[contract]
pub struct ComplianceOracle;

fn admin(e: &Env) -> Result<Address, OracleError> {
    e.storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(OracleError::NotInitialized)
}

fn zero_hash(e: &Env) -> BytesN<32> {
    BytesN::from_array(e, &[0u8; 32])
}

#[contractimpl]
impl ComplianceOracle {
    /// One-time initializer; the admin is the only writer. The admin may be
    /// an account or another contract (the escrow forwards its convenience
    /// setters here).
    pub fn initialize(e: Env, admin: Address) -> Result<(), OracleError> {
        if e.storage().instance().has(&DataKey::Admin) {
            return Err(OracleError::AlreadyInitialized);
        }
        e.storage().instance().set(&DataKey::Admin, &admin);
        Ok(())
    }

    pub fn set_allowlist(e: Env, account: Address, allowed: bool) -> Result<(), OracleError> {
        admin(&e)?.require_auth();
        if allowed {
            e.storage()
                .persistent()
                .set(&DataKey::Allow(account.clone()), &true);
        } else {
            e.storage()
                .persistent()
                .remove(&DataKey::Allow(account.clone()));
        }
        e.events()
            .publish((symbol_short!("allow"), account), allowed);
        Ok(())
    }

    pub fn is_allowlisted(e: Env, account: Address) -> bool {
        e.storage()
            .persistent()
            .get(&DataKey::Allow(account))
            .unwrap_or(false)
    }

    /// Store a KYC credential commitment. The all-zero hash clears it.
    pub fn set_credential_hash(
        e: Env,
        account: Address,
        credential: BytesN<32>,
    ) -> Result<(), OracleError> {
        admin(&e)?.require_auth();
        if credential == zero_hash(&e) {
            e.storage()
                .persistent()
                .remove(&DataKey::Cred(account.clone()));
        } else {
            e.storage()
                .persistent()
                .set(&DataKey::Cred(account.clone()), &credential);
        }
        e.events()
            .publish((symbol_short!("cred"), account), credential);
        Ok(())
    }

    pub fn has_credential(e: Env, account: Address) -> bool {
        e.storage().persistent().has(&DataKey::Cred(account))
    }

    pub fn get_credential_hash(e: Env, account: Address) -> Option<BytesN<32>> {
        e.storage().persistent().get(&DataKey::Cred(account))
    }

    pub fn set_unlock_at(e: Env, property_id: u64, unlock_at: u64) -> Result<(), OracleError> {
        admin(&e)?.require_auth();
        e.storage()
            .persistent()
            .set(&DataKey::Unlock(property_id), &unlock_at);
        e.events()
            .publish((symbol_short!("unlock"), property_id), unlock_at);
        Ok(())
    }

    pub fn get_unlock_at(e: Env, property_id: u64) -> u64 {
        e.storage()
            .persistent()
            .get(&DataKey::Unlock(property_id))
            .unwrap_or(0)
    }

    pub fn register_doc_hash(
        e: Env,
        property_id: u64,
        doc_type: DocType,
        hash: BytesN<32>,
    ) -> Result<(), OracleError> {
        admin(&e)?.require_auth();
        e.storage()
            .persistent()
            .set(&DataKey::Doc(property_id, doc_type), &hash);
        e.events()
            .publish((symbol_short!("doc"), property_id), (doc_type, hash));
        Ok(())
    }

    pub fn get_doc_hash(e: Env, property_id: u64, doc_type: DocType) -> Option<BytesN<32>> {
        e.storage().persistent().get(&DataKey::Doc(property_id, doc_type))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::{testutils::Address as _, Env};

    fn setup<'a>() -> (Env, Address, ComplianceOracleClient<'a>) {
        let env = Env::default();
        env.mock_all_auths();
        let admin = Address::generate(&env);
        let contract_id = env.register(ComplianceOracle, ());
        let client = ComplianceOracleClient::new(&env, &contract_id);
        client.initialize(&admin);
        (env, admin, client)
    }

    fn hash(env: &Env, fill: u8) -> BytesN<32> {
        BytesN::from_array(env, &[fill; 32])
    }

    #[test]
    fn allowlist_defaults_false_and_round_trips() {
        let (env, _admin, client) = setup();
        let account = Address::generate(&env);
        assert!(!client.is_allowlisted(&account));
        client.set_allowlist(&account, &true);
        assert!(client.is_allowlisted(&account));
        client.set_allowlist(&account, &false);
        assert!(!client.is_allowlisted(&account));
    }

    #[test]
    fn credential_hash_set_and_cleared_by_zero() {
        let (env, _admin, client) = setup();
        let account = Address::generate(&env);
        assert!(!client.has_credential(&account));

        client.set_credential_hash(&account, &hash(&env, 7));
        assert!(client.has_credential(&account));
        assert_eq!(client.get_credential_hash(&account), Some(hash(&env, 7)));

        client.set_credential_hash(&account, &hash(&env, 0));
        assert!(!client.has_credential(&account));
        assert_eq!(client.get_credential_hash(&account), None);
    }

    #[test]
    fn unlock_defaults_to_zero() {
        let (_env, _admin, client) = setup();
        assert_eq!(client.get_unlock_at(&1u64), 0);
        client.set_unlock_at(&1u64, &12_345u64);
        assert_eq!(client.get_unlock_at(&1u64), 12_345);
    }

    #[test]
    fn doc_hashes_keyed_by_type() {
        let (env, _admin, client) = setup();
        client.register_doc_hash(&1u64, &DocType::Deed, &hash(&env, 1));
        client.register_doc_hash(&1u64, &DocType::Disclosure, &hash(&env, 2));
        assert_eq!(
            client.get_doc_hash(&1u64, &DocType::Deed),
            Some(hash(&env, 1))
        );
        assert_eq!(
            client.get_doc_hash(&1u64, &DocType::Disclosure),
            Some(hash(&env, 2))
        );
        assert_eq!(client.get_doc_hash(&1u64, &DocType::InspectionReport), None);
    }

    #[test]
    #[should_panic(expected = "Error(Contract, #1)")]
    fn double_initialize_fails() {
        let (env, _admin, client) = setup();
        client.initialize(&Address::generate(&env));
    }
}
