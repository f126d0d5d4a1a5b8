pub mod audit;
pub mod group;
pub mod transaction;
pub mod user;

pub use audit::ActivityLogEntry;
pub use group::{Group, GroupDetails, GroupMember, GroupPatch, MemberStatus, NewGroup, Role};
pub use transaction::{
    CreateTransactionRequest, NewTransaction, NewTransactionDetail, Transaction, TransactionDetail,
    TransactionDetailInput, TransactionInput, UpdateTransactionRequest,
};
pub use user::{NewUser, User, UserPatch};
