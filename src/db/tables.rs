use redb::TableDefinition;

/// Rate limits table: `{prefix}:{action}:{identifier}` -> AttemptLog (bincode)
pub const RATE_LIMITS: TableDefinition<&str, &[u8]> = TableDefinition::new("rate_limits");
