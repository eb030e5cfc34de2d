//! Storage port for accounts, positions and transfers.
//!
//! The core only needs a narrow slice of persistence: read balances and
//! positions, insert positions, and write a position closure together with the
//! balance change it causes. [`Ledger`] is that slice. [`MemoryLedger`] is the
//! in-process implementation.
//!
//! Every balance write goes through a [`UnitOfWork`]: writes are staged, then
//! either all applied on commit or all discarded. The whole unit runs under the
//! ledger's writer lock, so balance updates for any account are serialized.
//!
//! Waiting for the lock and running a unit are both bounded by the ledger's
//! timeout. Overrunning it is a storage fault: the unit rolls back and the
//! caller retries later.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::account::{Account, AccountError};
use crate::conditional::ClosureInstruction;
use crate::custody::{Transfer, TransferKind};
use crate::position::{OpenRequest, Position};
use crate::types::{OwnerId, PositionId, Quote, Timestamp, TransferId};

/// Points inside a unit of work where a storage fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    AfterPositionWrite,
    AfterBalanceWrite,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Account {0:?} not found")]
    AccountNotFound(OwnerId),

    #[error("Account {0:?} already exists")]
    AccountExists(OwnerId),

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Position {0:?} is already closed")]
    PositionClosed(PositionId),

    #[error("Position {position:?} is not owned by {owner:?}")]
    NotOwner { position: PositionId, owner: OwnerId },

    #[error("Transfer {0:?} not found")]
    TransferNotFound(TransferId),

    #[error("Transfer {0:?} is not a pending deposit")]
    TransferNotPending(TransferId),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Storage fault at {0:?}")]
    Fault(FaultPoint),

    #[error("Storage did not respond within {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    // storage faults roll back and are retried; everything else is a business outcome
    pub fn is_fault(&self) -> bool {
        matches!(self, LedgerError::Fault(_) | LedgerError::Timeout(_))
    }
}

/// Every call must return within a bounded time. A call that cannot reach its
/// storage in time fails with a fault instead of blocking the tick.
pub trait Ledger: Send + Sync {
    fn create_account(&self, owner: OwnerId, initial_balance: Quote, at: Timestamp) -> Result<Account, LedgerError>;

    fn account(&self, owner: OwnerId) -> Result<Account, LedgerError>;

    /// Inserts an open position. Margin is the caller's concern.
    fn insert_position(&self, request: OpenRequest, at: Timestamp) -> Result<Position, LedgerError>;

    fn position(&self, id: PositionId) -> Result<Position, LedgerError>;

    /// All open positions, ascending by id.
    fn open_positions(&self) -> Result<Vec<Position>, LedgerError>;

    fn open_positions_for(&self, owner: OwnerId) -> Result<Vec<Position>, LedgerError>;

    /// Closed positions, most recently closed first.
    fn closed_positions_for(&self, owner: OwnerId, limit: usize) -> Result<Vec<Position>, LedgerError>;

    /// Closes the position and applies its pnl to the owner's balance as one unit.
    fn settle(&self, instruction: &ClosureInstruction, at: Timestamp) -> Result<Position, LedgerError>;

    fn request_deposit(&self, owner: OwnerId, amount: Quote, at: Timestamp) -> Result<Transfer, LedgerError>;

    /// Marks a pending deposit approved and credits the balance as one unit.
    fn approve_deposit(&self, id: TransferId, at: Timestamp) -> Result<(Transfer, Account), LedgerError>;

    /// Debits the balance and records the withdrawal as one unit.
    fn request_withdrawal(&self, owner: OwnerId, amount: Quote, at: Timestamp) -> Result<(Transfer, Account), LedgerError>;

    /// An owner's transfers, newest first.
    fn transfers_for(&self, owner: OwnerId) -> Result<Vec<Transfer>, LedgerError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<OwnerId, Account>,
    positions: BTreeMap<PositionId, Position>,
    transfers: BTreeMap<TransferId, Transfer>,
    next_position_id: u64,
    next_transfer_id: u64,
}

impl LedgerState {
    fn next_position_id(&mut self) -> PositionId {
        self.next_position_id += 1;
        PositionId(self.next_position_id)
    }

    fn next_transfer_id(&mut self) -> TransferId {
        self.next_transfer_id += 1;
        TransferId(self.next_transfer_id)
    }
}

// armed faults and delays fire once per count, then disarm
#[derive(Debug, Default)]
struct FaultPlan {
    armed: HashMap<FaultPoint, u32>,
    delays: HashMap<FaultPoint, (Duration, u32)>,
}

impl FaultPlan {
    fn check(&mut self, point: FaultPoint) -> Result<(), LedgerError> {
        if let Some((delay, remaining)) = self.delays.get_mut(&point) {
            if *remaining > 0 {
                *remaining -= 1;
                std::thread::sleep(*delay);
            }
        }

        match self.armed.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(LedgerError::Fault(point))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: LedgerState,
    faults: FaultPlan,
}

/// Staged writes over a locked ledger. Reads see staged rows first.
pub struct UnitOfWork<'a> {
    inner: &'a mut Inner,
    accounts: HashMap<OwnerId, Account>,
    positions: HashMap<PositionId, Position>,
    transfers: HashMap<TransferId, Transfer>,
    timeout: Duration,
    deadline: Instant,
}

impl<'a> UnitOfWork<'a> {
    fn begin(inner: &'a mut Inner, timeout: Duration) -> Self {
        Self {
            inner,
            accounts: HashMap::new(),
            positions: HashMap::new(),
            transfers: HashMap::new(),
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    // injected faults first, then the unit's deadline
    fn checkpoint(&mut self, point: FaultPoint) -> Result<(), LedgerError> {
        self.inner.faults.check(point)?;
        if Instant::now() >= self.deadline {
            return Err(LedgerError::Timeout(self.timeout));
        }
        Ok(())
    }

    pub fn account(&self, owner: OwnerId) -> Result<Account, LedgerError> {
        self.accounts
            .get(&owner)
            .or_else(|| self.inner.state.accounts.get(&owner))
            .cloned()
            .ok_or(LedgerError::AccountNotFound(owner))
    }

    pub fn position(&self, id: PositionId) -> Result<Position, LedgerError> {
        self.positions
            .get(&id)
            .or_else(|| self.inner.state.positions.get(&id))
            .cloned()
            .ok_or(LedgerError::PositionNotFound(id))
    }

    pub fn transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        self.transfers
            .get(&id)
            .or_else(|| self.inner.state.transfers.get(&id))
            .cloned()
            .ok_or(LedgerError::TransferNotFound(id))
    }

    pub fn put_position(&mut self, position: Position) -> Result<(), LedgerError> {
        self.positions.insert(position.id, position);
        self.checkpoint(FaultPoint::AfterPositionWrite)
    }

    pub fn put_account(&mut self, account: Account) -> Result<(), LedgerError> {
        self.accounts.insert(account.owner, account);
        self.checkpoint(FaultPoint::AfterBalanceWrite)
    }

    pub fn put_transfer(&mut self, transfer: Transfer) {
        self.transfers.insert(transfer.id, transfer);
    }

    pub fn new_transfer_id(&mut self) -> TransferId {
        // ids are never reused, even if the unit rolls back
        self.inner.state.next_transfer_id()
    }

    /// Applies every staged write, or none of them.
    pub fn commit(mut self) -> Result<(), LedgerError> {
        self.checkpoint(FaultPoint::Commit)?;

        let state = &mut self.inner.state;
        state.accounts.extend(self.accounts.drain());
        state.positions.extend(self.positions.drain());
        state.transfers.extend(self.transfers.drain());
        Ok(())
    }

    pub fn rollback(mut self) {
        self.accounts.clear();
        self.positions.clear();
        self.transfers.clear();
    }
}

pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_millis(250);

/// In-process ledger. A single writer lock serializes every unit of work.
#[derive(Debug)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
    timeout: Duration,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_UNIT_TIMEOUT)
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds both the wait for the writer lock and the length of one unit.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arms `point` to fail the next `times` units that reach it.
    pub fn inject_fault(&self, point: FaultPoint, times: u32) {
        *self.inner.lock().faults.armed.entry(point).or_insert(0) += times;
    }

    /// Makes the next `times` units that reach `point` stall for `delay` while
    /// holding the writer lock.
    pub fn inject_delay(&self, point: FaultPoint, delay: Duration, times: u32) {
        self.inner.lock().faults.delays.insert(point, (delay, times));
    }

    pub fn clear_faults(&self) {
        let mut inner = self.inner.lock();
        inner.faults.armed.clear();
        inner.faults.delays.clear();
    }

    pub fn position_count(&self) -> usize {
        self.inner.lock().state.positions.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .try_lock_for(self.timeout)
            .ok_or(LedgerError::Timeout(self.timeout))
    }

    /// Runs `work` as one unit: commit on Ok, roll back on Err.
    pub fn unit<T>(
        &self,
        work: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let result = self.run_unit(work);
        if let Err(e) = &result {
            if e.is_fault() {
                warn!(error = %e, "unit of work rolled back");
            }
        }
        result
    }

    fn run_unit<T>(
        &self,
        work: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut inner = self.lock()?;
        let mut uow = UnitOfWork::begin(&mut inner, self.timeout);

        match work(&mut uow) {
            Ok(value) => uow.commit().map(|()| value),
            Err(e) => {
                uow.rollback();
                Err(e)
            }
        }
    }
}

impl Ledger for MemoryLedger {
    fn create_account(&self, owner: OwnerId, initial_balance: Quote, at: Timestamp) -> Result<Account, LedgerError> {
        let mut inner = self.lock()?;
        if inner.state.accounts.contains_key(&owner) {
            return Err(LedgerError::AccountExists(owner));
        }
        let account = Account::new(owner, initial_balance, at);
        inner.state.accounts.insert(owner, account.clone());
        Ok(account)
    }

    fn account(&self, owner: OwnerId) -> Result<Account, LedgerError> {
        self.lock()?
            .state
            .accounts
            .get(&owner)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(owner))
    }

    fn insert_position(&self, request: OpenRequest, at: Timestamp) -> Result<Position, LedgerError> {
        let mut inner = self.lock()?;
        if !inner.state.accounts.contains_key(&request.owner) {
            return Err(LedgerError::AccountNotFound(request.owner));
        }
        let id = inner.state.next_position_id();
        let position = Position::open(id, request, at);
        inner.state.positions.insert(id, position.clone());
        Ok(position)
    }

    fn position(&self, id: PositionId) -> Result<Position, LedgerError> {
        self.lock()?
            .state
            .positions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::PositionNotFound(id))
    }

    fn open_positions(&self) -> Result<Vec<Position>, LedgerError> {
        Ok(self
            .lock()?
            .state
            .positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    fn open_positions_for(&self, owner: OwnerId) -> Result<Vec<Position>, LedgerError> {
        Ok(self
            .lock()?
            .state
            .positions
            .values()
            .filter(|p| p.owner == owner && p.is_open())
            .cloned()
            .collect())
    }

    fn closed_positions_for(&self, owner: OwnerId, limit: usize) -> Result<Vec<Position>, LedgerError> {
        let mut closed: Vec<Position> = self
            .lock()?
            .state
            .positions
            .values()
            .filter(|p| p.owner == owner && !p.is_open())
            .cloned()
            .collect();

        closed.sort_by(|a, b| b.closed_at.cmp(&a.closed_at).then(b.id.cmp(&a.id)));
        closed.truncate(limit);
        Ok(closed)
    }

    fn settle(&self, instruction: &ClosureInstruction, at: Timestamp) -> Result<Position, LedgerError> {
        self.unit(|uow| {
            let position = uow.position(instruction.position_id)?;
            if position.owner != instruction.owner {
                return Err(LedgerError::NotOwner {
                    position: position.id,
                    owner: instruction.owner,
                });
            }
            if !position.is_open() {
                return Err(LedgerError::PositionClosed(position.id));
            }

            let closed = position.closed(instruction.close_price, instruction.pnl, instruction.reason, at);
            uow.put_position(closed.clone())?;

            let mut account = uow.account(position.owner)?;
            account.realize_pnl(instruction.pnl)?;
            uow.put_account(account)?;

            Ok(closed)
        })
    }

    fn request_deposit(&self, owner: OwnerId, amount: Quote, at: Timestamp) -> Result<Transfer, LedgerError> {
        self.unit(|uow| {
            uow.account(owner)?;
            let transfer = Transfer::deposit_request(uow.new_transfer_id(), owner, amount, at);
            uow.put_transfer(transfer.clone());
            Ok(transfer)
        })
    }

    fn approve_deposit(&self, id: TransferId, at: Timestamp) -> Result<(Transfer, Account), LedgerError> {
        self.unit(|uow| {
            let mut transfer = uow.transfer(id)?;
            if transfer.kind != TransferKind::Deposit || !transfer.is_pending() {
                return Err(LedgerError::TransferNotPending(id));
            }
            transfer.approve(at);
            uow.put_transfer(transfer.clone());

            let mut account = uow.account(transfer.owner)?;
            account.deposit(transfer.amount)?;
            uow.put_account(account.clone())?;

            Ok((transfer, account))
        })
    }

    fn request_withdrawal(&self, owner: OwnerId, amount: Quote, at: Timestamp) -> Result<(Transfer, Account), LedgerError> {
        self.unit(|uow| {
            let mut account = uow.account(owner)?;
            account.withdraw(amount)?;
            uow.put_account(account.clone())?;

            let transfer = Transfer::withdrawal(uow.new_transfer_id(), owner, amount, at);
            uow.put_transfer(transfer.clone());

            Ok((transfer, account))
        })
    }

    fn transfers_for(&self, owner: OwnerId) -> Result<Vec<Transfer>, LedgerError> {
        Ok(self
            .lock()?
            .state
            .transfers
            .values()
            .rev()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect())
    }
}
