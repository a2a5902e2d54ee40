#![cfg_attr(not(feature = "std"), no_std, no_main)]

pub use self::psp22_token::{PSP22Error, Psp22Token, Psp22TokenRef};

/// psp22_token - minimal PSP22 token settling token-denominated payment requests
///
/// Only the PSP22 surface the gateway relies on: balances, allowances and
/// `transfer_from` under the standard `PSP22::transfer_from` selector.
#[ink::contract]
mod psp22_token {
    use ink::prelude::string::String;
    use ink::prelude::vec::Vec;
    use ink::storage::Mapping;

    /// PSP22 error types
    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum PSP22Error {
        Custom(String),
        InsufficientBalance,
        InsufficientAllowance,
        ZeroRecipientAddress,
        ZeroSenderAddress,
    }

    pub type Result<T> = core::result::Result<T, PSP22Error>;

    #[ink(storage)]
    pub struct Psp22Token {
        total_supply: Balance,
        balances: Mapping<AccountId, Balance>,
        allowances: Mapping<(AccountId, AccountId), Balance>,
    }

    #[ink(event)]
    pub struct Transfer {
        #[ink(topic)]
        from: Option<AccountId>,
        #[ink(topic)]
        to: Option<AccountId>,
        value: Balance,
    }

    #[ink(event)]
    pub struct Approval {
        #[ink(topic)]
        owner: AccountId,
        #[ink(topic)]
        spender: AccountId,
        value: Balance,
    }

    impl Psp22Token {
        /// Mints the whole supply to the caller
        #[ink(constructor)]
        pub fn new(initial_supply: Balance) -> Self {
            let caller = Self::env().caller();
            let mut balances = Mapping::default();
            balances.insert(caller, &initial_supply);

            Self {
                total_supply: initial_supply,
                balances,
                allowances: Mapping::default(),
            }
        }

        #[ink(message, selector = 0x162df8c2)] // PSP22::total_supply
        pub fn total_supply(&self) -> Balance {
            self.total_supply
        }

        #[ink(message, selector = 0x6568382f)] // PSP22::balance_of
        pub fn balance_of(&self, owner: AccountId) -> Balance {
            self.balances.get(owner).unwrap_or(0)
        }

        #[ink(message, selector = 0x4d47d921)] // PSP22::allowance
        pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Balance {
            self.allowances.get((owner, spender)).unwrap_or(0)
        }

        #[ink(message, selector = 0xdb20f9f5)] // PSP22::transfer
        pub fn transfer(&mut self, to: AccountId, value: Balance, _data: Vec<u8>) -> Result<()> {
            let from = self.env().caller();
            self.transfer_from_to(from, to, value)
        }

        #[ink(message, selector = 0xb20f1bbd)] // PSP22::approve
        pub fn approve(&mut self, spender: AccountId, value: Balance) -> Result<()> {
            let owner = self.env().caller();
            self.allowances.insert((owner, spender), &value);
            self.env().emit_event(Approval { owner, spender, value });
            Ok(())
        }

        /// Spend `value` of `from`'s tokens on behalf of the caller
        #[ink(message, selector = 0x54b3c76e)] // PSP22::transfer_from
        pub fn transfer_from(
            &mut self,
            from: AccountId,
            to: AccountId,
            value: Balance,
            _data: Vec<u8>,
        ) -> Result<()> {
            let caller = self.env().caller();
            let allowance = self.allowance(from, caller);
            let new_allowance = allowance
                .checked_sub(value)
                .ok_or(PSP22Error::InsufficientAllowance)?;

            self.transfer_from_to(from, to, value)?;
            self.allowances.insert((from, caller), &new_allowance);
            Ok(())
        }

        fn transfer_from_to(&mut self, from: AccountId, to: AccountId, value: Balance) -> Result<()> {
            if to == AccountId::from([0u8; 32]) {
                return Err(PSP22Error::ZeroRecipientAddress);
            }

            let new_from_balance = self
                .balance_of(from)
                .checked_sub(value)
                .ok_or(PSP22Error::InsufficientBalance)?;
            self.balances.insert(from, &new_from_balance);

            let new_to_balance = self
                .balance_of(to)
                .checked_add(value)
                .ok_or(PSP22Error::Custom(String::from("Overflow")))?;
            self.balances.insert(to, &new_to_balance);

            self.env().emit_event(Transfer {
                from: Some(from),
                to: Some(to),
                value,
            });

            Ok(())
        }
    }

}
