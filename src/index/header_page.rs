use crate::common::{PageId, HTABLE_HEADER_MAX_DEPTH, INVALID_PAGE_ID, PAGE_SIZE};

// Header page layout:
//   [0..4)   max_depth: u32
//   [4..)    directory_page_ids: [u32; 1 << max_depth]
const MAX_DEPTH_OFFSET: usize = 0;
const DIRECTORY_IDS_OFFSET: usize = 4;
const DIRECTORY_ID_SIZE: usize = 4;

/// Mutable view of the hash index root page. Routes a hash to one of
/// `2^max_depth` directory pages by its topmost bits.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Initializes the page: stores `max_depth` and marks every
    /// directory slot invalid.
    pub fn init(&mut self, max_depth: u32) {
        assert!(max_depth <= HTABLE_HEADER_MAX_DEPTH);
        self.data.fill(0);
        self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
            .copy_from_slice(&max_depth.to_le_bytes());
        for i in 0..(1u32 << max_depth) {
            self.set_directory_page_id(i, INVALID_PAGE_ID);
        }
    }

    pub fn max_depth(&self) -> u32 {
        read_max_depth(self.data)
    }

    /// Number of directory slots.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    pub fn hash_to_directory_index(&self, hash: u32) -> u32 {
        hash_to_directory_index(self.data, hash)
    }

    pub fn directory_page_id(&self, directory_idx: u32) -> PageId {
        read_directory_page_id(self.data, directory_idx)
    }

    pub fn set_directory_page_id(&mut self, directory_idx: u32, page_id: PageId) {
        let offset = slot_offset(directory_idx);
        self.data[offset..offset + DIRECTORY_ID_SIZE].copy_from_slice(&page_id.0.to_le_bytes());
    }
}

/// Read-only view of the hash index root page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn max_depth(&self) -> u32 {
        read_max_depth(self.data)
    }

    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    pub fn hash_to_directory_index(&self, hash: u32) -> u32 {
        hash_to_directory_index(self.data, hash)
    }

    pub fn directory_page_id(&self, directory_idx: u32) -> PageId {
        read_directory_page_id(self.data, directory_idx)
    }
}

fn read_max_depth(data: &[u8]) -> u32 {
    u32::from_le_bytes(
        data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
            .try_into()
            .unwrap(),
    )
}

fn hash_to_directory_index(data: &[u8], hash: u32) -> u32 {
    let max_depth = read_max_depth(data);
    // A zero-depth header has a single slot; shifting by 32 would be
    // out of range, so the case is explicit.
    if max_depth == 0 {
        0
    } else {
        hash >> (32 - max_depth)
    }
}

fn read_directory_page_id(data: &[u8], directory_idx: u32) -> PageId {
    let offset = slot_offset(directory_idx);
    PageId::new(u32::from_le_bytes(
        data[offset..offset + DIRECTORY_ID_SIZE].try_into().unwrap(),
    ))
}

fn slot_offset(directory_idx: u32) -> usize {
    DIRECTORY_IDS_OFFSET + directory_idx as usize * DIRECTORY_ID_SIZE
}
