//! Club members as loaded from the packed member file.

use fixedstr::str16;
use heapless::Vec;

use crate::Error;

/// Bits 0..=7 block items 1..=8
pub const MEMBERPROP_NOT_ITEM_MASK: u16 = 0x00FF;
pub const MEMBERPROP_CLUBCARD: u16 = 0x0100;
pub const MEMBERPROP_TEAMCARD: u16 = 0x0200;

const HEADER_SIZE: usize = 28;
const MEMBER_SIZE: usize = 44;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: u32,
    pub name: str16,
    pub given_name: str16,
    pub properties: u16,
    /// Percent
    pub discount: u16,
    pub card_id: u32,
}

impl Member {
    /// Items are numbered from 1; anything outside 1..=8 is not vendable
    pub fn is_available(&self, item: u16) -> bool {
        match item {
            1..=8 => self.properties & (1 << (item - 1)) == 0,
            _ => false,
        }
    }

    /// Discount granted on `price`, in cents
    pub fn discount_on(&self, price: u16) -> u16 {
        let percent = u32::from(self.discount.min(100));
        (u32::from(price) * percent / 100) as u16
    }
}

pub trait MemberDirectory {
    fn by_id(&self, id: u32) -> Option<&Member>;
    fn by_index(&self, index: usize) -> Option<&Member>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Header of the member file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberFileHeader {
    pub version: u32,
    pub modified: u32,
    pub author: str16,
    pub entry_count: u32,
}

/// Fixed capacity member list
#[derive(Clone, Debug, Default)]
pub struct MemberTable<const N: usize> {
    members: Vec<Member, N>,
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// NUL padded field to string, non UTF-8 content becomes empty
fn text(bytes: &[u8]) -> str16 {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    match core::str::from_utf8(&bytes[..end]) {
        Ok(s) => str16::from(s),
        Err(_) => {
            error!("non-utf8 text in member file");
            str16::from("")
        }
    }
}

impl<const N: usize> MemberTable<N> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub fn push(&mut self, member: Member) -> Result<(), Error> {
        self.members.push(member).map_err(|_| Error::MemberFile)
    }

    /// Parse a complete member file image
    pub fn parse(bytes: &[u8]) -> Result<(MemberFileHeader, Self), Error> {
        if bytes.len() < HEADER_SIZE {
            error!("member file shorter than its header");
            return Err(Error::MemberFile);
        }
        let header = MemberFileHeader {
            version: le32(bytes, 0),
            modified: le32(bytes, 4),
            author: text(&bytes[8..24]),
            entry_count: le32(bytes, 24),
        };

        let count = header.entry_count as usize;
        if count > N {
            error!("member file holds {} records, capacity is {}", count, N);
            return Err(Error::MemberFile);
        }
        let body = &bytes[HEADER_SIZE..];
        if body.len() < count * MEMBER_SIZE {
            error!("member file holds fewer records than announced ({})", count);
            return Err(Error::MemberFile);
        }

        let mut table = Self::new();
        for record in body.chunks_exact(MEMBER_SIZE).take(count) {
            table.push(Member {
                id: le32(record, 0),
                name: text(&record[4..20]),
                given_name: text(&record[20..36]),
                properties: le16(record, 36),
                discount: le16(record, 38),
                card_id: le32(record, 40),
            })?;
        }
        info!("loaded {} members", table.len());
        Ok((header, table))
    }
}

impl<const N: usize> MemberDirectory for MemberTable<N> {
    fn by_id(&self, id: u32) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    fn by_index(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}
