#![cfg_attr(not(feature = "std"), no_std, no_main)]

/// Payment Request Gateway Smart Contract
///
/// Requesters record payment requests naming a receiver and an amount, either in the
/// native currency or in a PSP22 token. Any payer settles a request exactly once; the
/// paid flag is written before funds move so a request can never be paid twice.
#[ink::contract]
mod payment_gateway {
    use ink::env::call::{build_call, ExecutionInput, Selector};
    use ink::prelude::string::{String, ToString};
    use ink::prelude::vec::Vec;
    use ink::storage::Mapping;

    /// Version of the gateway's message and event layout.
    pub const GATEWAY_VERSION: &str = "1.0.0";

    /// Longest memo accepted on a payment request, in bytes.
    pub const MAX_MEMO_LEN: usize = 256;

    /// A recorded payment request
    #[derive(Debug, Clone, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub struct PaymentRequest {
        pub id: String,
        /// Amount in the smallest unit of the native currency or of the token
        pub amount: Balance,
        pub memo: String,
        pub receiver_account_id: AccountId,
        pub requester_account_id: AccountId,
        /// PSP22 token contract, `None` for the native currency
        pub ft_token_account_id: Option<AccountId>,
        /// Seconds since epoch, as supplied by the requester
        pub timestamp: u64,
        pub paid: bool,
        pub payer_account_id: Option<AccountId>,
    }

    /// PSP22 error types returned by token contracts
    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum PSP22Error {
        Custom(String),
        InsufficientBalance,
        InsufficientAllowance,
        ZeroRecipientAddress,
        ZeroSenderAddress,
    }

    /// Errors that can occur while creating or settling payment requests
    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum Error {
        /// Payment amount is zero
        ZeroAmount,
        /// Memo exceeds `MAX_MEMO_LEN` bytes
        MemoTooLong,
        /// Receiver is the zero account or the gateway itself
        InvalidReceiver,
        /// Token is the zero account or the gateway itself
        InvalidToken,
        /// Attached value does not cover the storage premium
        InsufficientStorageDeposit,
        /// Attached value is below the requested amount
        InsufficientDeposit,
        /// Native value attached to a token settlement
        UnexpectedDeposit,
        /// No request is stored under the given id
        UnknownRequest,
        /// Request has already been settled
        AlreadyPaid,
        /// Native transfer failed
        TransferFailed,
        /// Token contract rejected or failed the transfer
        TokenTransferFailed,
        /// Caller is not the contract owner
        NotOwner,
        /// Request id counter exhausted. The counter stops one short of `u64::MAX`,
        /// which is never issued.
        IdOverflow,
    }

    pub type Result<T> = core::result::Result<T, Error>;

    /// Payment Gateway Contract Storage
    #[ink(storage)]
    pub struct PaymentGateway {
        /// Payment requests by sequence number
        requests: Mapping<u64, PaymentRequest>,
        /// Sequence number handed to the next request, starts at 1
        next_id: u64,
        /// Requests created per requester: (requester, slot) -> request sequence number
        requester_requests: Mapping<(AccountId, u64), u64>,
        requester_request_count: Mapping<AccountId, u64>,
        /// Contract owner (for administrative functions)
        owner: AccountId,
        /// Value a requester must attach to cover storage of a new request
        storage_deposit: Balance,
    }

    /// Events emitted by the contract
    #[ink(event)]
    pub struct PaymentRequestCreated {
        #[ink(topic)]
        requester: AccountId,
        #[ink(topic)]
        receiver: AccountId,
        id: String,
        amount: Balance,
        ft_token_account_id: Option<AccountId>,
    }

    #[ink(event)]
    pub struct PaymentRequestTransferSuccess {
        #[ink(topic)]
        sender: AccountId,
        #[ink(topic)]
        receiver: AccountId,
        id: String,
        amount: Balance,
        memo: String,
        ft_token_account_id: Option<AccountId>,
    }

    #[ink(event)]
    pub struct StorageDepositUpdated {
        old_deposit: Balance,
        new_deposit: Balance,
    }

    impl PaymentGateway {
        /// Constructor - creates a new, empty payment gateway
        ///
        /// `storage_deposit` is the premium attached to every new request.
        #[ink(constructor)]
        pub fn new(storage_deposit: Balance) -> Self {
            Self {
                requests: Mapping::default(),
                next_id: 1,
                requester_requests: Mapping::default(),
                requester_request_count: Mapping::default(),
                owner: Self::env().caller(),
                storage_deposit,
            }
        }

        // ============================================================
        // PAYMENT REQUESTS
        // ============================================================

        /// Record a payment request in the native currency
        ///
        /// # Arguments
        /// * `amount` - Amount the receiver gets, in the smallest unit
        /// * `memo` - Free-form description
        /// * `receiver_account_id` - Account that receives the funds on settlement
        /// * `timestamp` - Creation time in seconds, supplied by the requester
        ///
        /// The caller must attach at least the storage premium; anything above it
        /// is refunded.
        ///
        /// # Returns
        /// Result with the new request id or Error
        #[ink(message, payable)]
        pub fn add_payment_request(
            &mut self,
            amount: Balance,
            memo: String,
            receiver_account_id: AccountId,
            timestamp: u64,
        ) -> Result<String> {
            self.create_request(amount, memo, receiver_account_id, timestamp, None)
        }

        /// Record a payment request denominated in a PSP22 token
        ///
        /// Settlement pulls `amount` tokens from the payer, who must have approved
        /// this contract as spender on `ft_token_account_id`.
        #[ink(message, payable)]
        pub fn add_token_payment_request(
            &mut self,
            amount: Balance,
            memo: String,
            receiver_account_id: AccountId,
            timestamp: u64,
            ft_token_account_id: AccountId,
        ) -> Result<String> {
            if self.is_reserved_account(&ft_token_account_id) {
                return Err(Error::InvalidToken);
            }
            self.create_request(
                amount,
                memo,
                receiver_account_id,
                timestamp,
                Some(ft_token_account_id),
            )
        }

        /// Settle a payment request
        ///
        /// # Arguments
        /// * `request_id` - Id returned when the request was created
        ///
        /// For native requests the caller attaches at least the requested amount;
        /// the surplus is refunded. Token requests must be called without value.
        ///
        /// # Returns
        /// Result with () or Error
        #[ink(message, payable)]
        pub fn transfer_funds(&mut self, request_id: String) -> Result<()> {
            let payer = self.env().caller();
            let attached = self.env().transferred_value();

            // 1. Look up the request
            let seq = Self::parse_id(&request_id)?;
            let mut request = self.requests.get(seq).ok_or(Error::UnknownRequest)?;

            // 2. Reject replays
            if request.paid {
                return Err(Error::AlreadyPaid);
            }

            // 3. Validate the attached value
            let surplus = match request.ft_token_account_id {
                Some(_) if attached > 0 => return Err(Error::UnexpectedDeposit),
                Some(_) => 0,
                None => attached
                    .checked_sub(request.amount)
                    .ok_or(Error::InsufficientDeposit)?,
            };

            // 4. Mark as paid BEFORE moving funds (prevent reentrancy)
            request.paid = true;
            request.payer_account_id = Some(payer);
            self.requests.insert(seq, &request);

            // 5. Move funds to the receiver
            match request.ft_token_account_id {
                Some(token) => self.transfer_tokens(
                    token,
                    payer,
                    request.receiver_account_id,
                    request.amount,
                    &request.id,
                )?,
                None => self
                    .env()
                    .transfer(request.receiver_account_id, request.amount)
                    .map_err(|_| Error::TransferFailed)?,
            }

            // 6. Return whatever was attached above the amount
            if surplus > 0 {
                self.refund(payer, surplus)?;
            }

            self.env().emit_event(PaymentRequestTransferSuccess {
                sender: payer,
                receiver: request.receiver_account_id,
                id: request.id,
                amount: request.amount,
                memo: request.memo,
                ft_token_account_id: request.ft_token_account_id,
            });

            Ok(())
        }

        /// Get a payment request by id
        #[ink(message)]
        pub fn payment_requests_for_id(&self, request_id: String) -> Result<PaymentRequest> {
            let seq = Self::parse_id(&request_id)?;
            self.requests.get(seq).ok_or(Error::UnknownRequest)
        }

        /// List payment requests in creation order, skipping `from_index` requests
        #[ink(message)]
        pub fn get_payment_requests(&self, from_index: u64, limit: u64) -> Vec<PaymentRequest> {
            let start = from_index.saturating_add(1);
            (start..=self.total_payment_requests())
                .take(Self::page_len(limit))
                .filter_map(|seq| self.requests.get(seq))
                .collect()
        }

        /// List the payment requests created by `account`, in creation order
        #[ink(message)]
        pub fn payment_requests_for_account(
            &self,
            account: AccountId,
            from_index: u64,
            limit: u64,
        ) -> Vec<PaymentRequest> {
            let count = self.requester_request_count.get(account).unwrap_or(0);
            (from_index..count)
                .take(Self::page_len(limit))
                .filter_map(|slot| self.requester_requests.get((account, slot)))
                .filter_map(|seq| self.requests.get(seq))
                .collect()
        }

        /// Number of payment requests ever created
        #[ink(message)]
        pub fn total_payment_requests(&self) -> u64 {
            self.next_id.saturating_sub(1)
        }

        // ============================================================
        // ADMIN FUNCTIONS
        // ============================================================

        /// Get the storage premium required for a new request
        #[ink(message)]
        pub fn get_storage_deposit(&self) -> Balance {
            self.storage_deposit
        }

        /// Update the storage premium (only owner)
        #[ink(message)]
        pub fn set_storage_deposit(&mut self, storage_deposit: Balance) -> Result<()> {
            if self.env().caller() != self.owner {
                return Err(Error::NotOwner);
            }
            let old_deposit = self.storage_deposit;
            self.storage_deposit = storage_deposit;
            self.env().emit_event(StorageDepositUpdated {
                old_deposit,
                new_deposit: storage_deposit,
            });
            Ok(())
        }

        /// Get contract owner
        #[ink(message)]
        pub fn get_owner(&self) -> AccountId {
            self.owner
        }

        #[ink(message)]
        pub fn version(&self) -> String {
            String::from(GATEWAY_VERSION)
        }

        // ============================================================
        // PRIVATE HELPER FUNCTIONS
        // ============================================================

        fn create_request(
            &mut self,
            amount: Balance,
            memo: String,
            receiver_account_id: AccountId,
            timestamp: u64,
            ft_token_account_id: Option<AccountId>,
        ) -> Result<String> {
            let requester = self.env().caller();
            let attached = self.env().transferred_value();

            // 1. Validate the request
            if amount == 0 {
                return Err(Error::ZeroAmount);
            }
            if memo.len() > MAX_MEMO_LEN {
                return Err(Error::MemoTooLong);
            }
            if self.is_reserved_account(&receiver_account_id) {
                return Err(Error::InvalidReceiver);
            }

            // 2. Storage premium must be covered
            let refund = attached
                .checked_sub(self.storage_deposit)
                .ok_or(Error::InsufficientStorageDeposit)?;

            // 3. Allocate the id and the requester slot
            let seq = self.next_id;
            let next_id = seq.checked_add(1).ok_or(Error::IdOverflow)?;
            let slot = self.requester_request_count.get(requester).unwrap_or(0);
            let next_slot = slot.checked_add(1).ok_or(Error::IdOverflow)?;

            let request = PaymentRequest {
                id: seq.to_string(),
                amount,
                memo,
                receiver_account_id,
                requester_account_id: requester,
                ft_token_account_id,
                timestamp,
                paid: false,
                payer_account_id: None,
            };

            // 4. Persist
            self.requests.insert(seq, &request);
            self.next_id = next_id;
            self.requester_requests.insert((requester, slot), &seq);
            self.requester_request_count.insert(requester, &next_slot);

            // Refunds of a single unit are not worth the transfer
            if refund > 1 {
                self.refund(requester, refund)?;
            }

            self.env().emit_event(PaymentRequestCreated {
                requester,
                receiver: receiver_account_id,
                id: request.id.clone(),
                amount,
                ft_token_account_id,
            });

            Ok(request.id)
        }

        /// Pull `amount` tokens from `from` to `to` through PSP22 `transfer_from`
        fn transfer_tokens(
            &self,
            token: AccountId,
            from: AccountId,
            to: AccountId,
            amount: Balance,
            id: &str,
        ) -> Result<()> {
            let result = build_call::<ink::env::DefaultEnvironment>()
                .call(token)
                .exec_input(
                    ExecutionInput::new(Selector::new(ink::selector_bytes!(
                        "PSP22::transfer_from"
                    )))
                    .push_arg(from)
                    .push_arg(to)
                    .push_arg(amount)
                    .push_arg(id.as_bytes().to_vec()),
                )
                .returns::<core::result::Result<(), PSP22Error>>()
                .try_invoke();

            match result {
                Ok(Ok(Ok(()))) => Ok(()),
                _ => Err(Error::TokenTransferFailed),
            }
        }

        fn refund(&self, to: AccountId, value: Balance) -> Result<()> {
            self.env()
                .transfer(to, value)
                .map_err(|_| Error::TransferFailed)
        }

        /// The zero account and the gateway itself can neither receive nor act as tokens
        fn is_reserved_account(&self, account: &AccountId) -> bool {
            *account == AccountId::from([0u8; 32]) || *account == self.env().account_id()
        }

        /// Only the canonical decimal spelling of an issued id resolves
        fn parse_id(request_id: &str) -> Result<u64> {
            let seq = request_id
                .parse::<u64>()
                .map_err(|_| Error::UnknownRequest)?;
            if seq.to_string() != request_id {
                return Err(Error::UnknownRequest);
            }
            Ok(seq)
        }

        fn page_len(limit: u64) -> usize {
            usize::try_from(limit).unwrap_or(usize::MAX)
        }
    }


}
