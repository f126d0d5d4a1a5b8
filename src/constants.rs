pub const USER_CREATED: &str = "USER_CREATED";
pub const USER_UPDATED: &str = "USER_UPDATED";
pub const USER_DELETED: &str = "USER_DELETED";

pub const GROUP_CREATED: &str = "GROUP_CREATED";
pub const GROUP_UPDATED: &str = "GROUP_UPDATED";
pub const GROUP_DELETED: &str = "GROUP_DELETED";
pub const MEMBERS_ADDED: &str = "MEMBERS_ADDED";
pub const MEMBER_STATUS_CHANGED: &str = "MEMBER_STATUS_CHANGED";
pub const MEMBER_PROMOTED: &str = "MEMBER_PROMOTED";
pub const MEMBER_DEMOTED: &str = "MEMBER_DEMOTED";
pub const MEMBER_REMOVED: &str = "MEMBER_REMOVED";
pub const MEMBER_LEFT: &str = "MEMBER_LEFT";
pub const OWNERSHIP_TRANSFERRED: &str = "OWNERSHIP_TRANSFERRED";

pub const TRANSACTION_CREATED: &str = "TRANSACTION_CREATED";
pub const TRANSACTION_UPDATED: &str = "TRANSACTION_UPDATED";
pub const TRANSACTION_DELETED: &str = "TRANSACTION_DELETED";

/// Body returned by the transaction listing while forced-error mode is on.
pub const FORCED_ERROR_MESSAGE: &str = "Mock error for testing logging and error handling";
