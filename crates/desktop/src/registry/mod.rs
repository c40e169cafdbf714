// Document identity: the path <-> id registry over the home database.

pub mod path_registry;
