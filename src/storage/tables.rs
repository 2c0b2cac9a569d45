use redb::TableDefinition;

/// Object rows: id -> ObjectRecord (msgpack)
pub const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Owner index: owner_id -> msgpack Vec of object ids
pub const OWNER_OBJECTS: TableDefinition<u64, &[u8]> = TableDefinition::new("owner_objects");
