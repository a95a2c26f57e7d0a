mod bucket_page;
mod directory_page;
mod hash_table;
mod header_page;
mod key_codec;
mod key_comparator;
mod key_hasher;

pub use bucket_page::{bucket_max_capacity, BucketPage, BucketPageRef};
pub use directory_page::{DirectoryPage, DirectoryPageRef};
pub use hash_table::DiskExtendibleHashTable;
pub use header_page::{HeaderPage, HeaderPageRef};
pub use key_codec::Storable;
pub use key_comparator::{KeyComparator, OrdComparator};
pub use key_hasher::{FxKeyHasher, IdentityKeyHasher, KeyHasher};
