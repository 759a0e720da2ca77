//! Minimal reader for kernel BTF (`/sys/kernel/btf/vmlinux`)
//!
//! Only what layout discovery needs: walk the type section once, keep struct and
//! union members plus the modifier chain, and answer "byte offset of member X in
//! struct Y". Members reached through anonymous structs/unions are found too, which
//! matters for `task_struct` on kernels built with struct randomization.

use std::path::Path;

use crate::domain::{BtfError, LayoutError};

const BTF_MAGIC: u16 = 0xEB9F;
const HEADER_MIN_LEN: usize = 24;
const TYPE_HEADER_LEN: usize = 12;

const KIND_INT: u32 = 1;
const KIND_PTR: u32 = 2;
const KIND_ARRAY: u32 = 3;
const KIND_STRUCT: u32 = 4;
const KIND_UNION: u32 = 5;
const KIND_ENUM: u32 = 6;
const KIND_FWD: u32 = 7;
const KIND_TYPEDEF: u32 = 8;
const KIND_VOLATILE: u32 = 9;
const KIND_CONST: u32 = 10;
const KIND_RESTRICT: u32 = 11;
const KIND_FUNC: u32 = 12;
const KIND_FUNC_PROTO: u32 = 13;
const KIND_VAR: u32 = 14;
const KIND_DATASEC: u32 = 15;
const KIND_FLOAT: u32 = 16;
const KIND_DECL_TAG: u32 = 17;
const KIND_TYPE_TAG: u32 = 18;
const KIND_ENUM64: u32 = 19;

/// Modifier chains longer than this are treated as unresolvable
const MAX_RESOLVE_DEPTH: usize = 32;

#[derive(Debug)]
struct BtfMember {
    name_off: u32,
    type_id: u32,
    /// Bit offset (low 24 bits only when the owning type has `kind_flag` set)
    offset: u32,
}

#[derive(Debug)]
struct BtfType {
    kind: u32,
    name_off: u32,
    kind_flag: bool,
    /// `size` for sized kinds, referenced type id for modifiers
    size_or_type: u32,
    members: Vec<BtfMember>,
}

/// Parsed BTF type and string sections
#[derive(Debug)]
pub struct Btf {
    /// Indexed by type id; id 0 is `void`
    types: Vec<BtfType>,
    strings: Vec<u8>,
}

impl Btf {
    /// Read and parse a BTF file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid BTF
    pub fn from_file(path: &Path) -> Result<Self, LayoutError> {
        let data = std::fs::read(path)
            .map_err(|source| LayoutError::Read { path: path.to_path_buf(), source })?;
        Ok(Self::parse(&data)?)
    }

    /// Parse a raw BTF blob in host byte order
    ///
    /// # Errors
    /// Returns an error on bad magic, truncated sections or unknown type kinds
    pub fn parse(data: &[u8]) -> Result<Self, BtfError> {
        let magic = read_u16(data, 0)?;
        if magic != BTF_MAGIC {
            return Err(BtfError::BadMagic(magic));
        }

        let hdr_len = read_u32(data, 4)? as usize;
        if hdr_len < HEADER_MIN_LEN {
            return Err(BtfError::Truncated(hdr_len));
        }
        let type_off = read_u32(data, 8)? as usize;
        let type_len = read_u32(data, 12)? as usize;
        let str_off = read_u32(data, 16)? as usize;
        let str_len = read_u32(data, 20)? as usize;

        let types_start = hdr_len + type_off;
        let types_end = types_start + type_len;
        let str_start = hdr_len + str_off;
        let str_end = str_start + str_len;

        let strings =
            data.get(str_start..str_end).ok_or(BtfError::Truncated(str_end))?.to_vec();
        if types_end > data.len() {
            return Err(BtfError::Truncated(types_end));
        }

        let mut types = vec![BtfType {
            kind: 0,
            name_off: 0,
            kind_flag: false,
            size_or_type: 0,
            members: Vec::new(),
        }];

        let mut pos = types_start;
        while pos < types_end {
            let name_off = read_u32(data, pos)?;
            let info = read_u32(data, pos + 4)?;
            let size_or_type = read_u32(data, pos + 8)?;
            pos += TYPE_HEADER_LEN;

            let vlen = (info & 0xffff) as usize;
            let kind = (info >> 24) & 0x1f;
            let kind_flag = info >> 31 == 1;
            let mut members = Vec::new();

            match kind {
                KIND_INT | KIND_VAR | KIND_DECL_TAG => pos += 4,
                KIND_ARRAY => pos += 12,
                KIND_STRUCT | KIND_UNION => {
                    members.reserve(vlen);
                    for _ in 0..vlen {
                        members.push(BtfMember {
                            name_off: read_u32(data, pos)?,
                            type_id: read_u32(data, pos + 4)?,
                            offset: read_u32(data, pos + 8)?,
                        });
                        pos += 12;
                    }
                }
                KIND_ENUM | KIND_FUNC_PROTO => pos += vlen * 8,
                KIND_DATASEC | KIND_ENUM64 => pos += vlen * 12,
                KIND_PTR | KIND_FWD | KIND_TYPEDEF | KIND_VOLATILE | KIND_CONST
                | KIND_RESTRICT | KIND_FUNC | KIND_FLOAT | KIND_TYPE_TAG => {}
                other => return Err(BtfError::UnknownKind(other)),
            }

            types.push(BtfType { kind, name_off, kind_flag, size_or_type, members });
        }

        Ok(Self { types, strings })
    }

    /// Byte offset of `member` inside `struct strukt`
    ///
    /// # Errors
    /// Returns an error if the struct has no full definition or lacks the member
    pub fn member_offset(&self, strukt: &str, member: &str) -> Result<u32, BtfError> {
        let id = self
            .types
            .iter()
            .position(|ty| {
                ty.kind == KIND_STRUCT && !ty.members.is_empty() && self.name(ty.name_off) == strukt
            })
            .ok_or_else(|| BtfError::StructNotFound(strukt.to_string()))?;

        self.find_member_bits(id, member).map(|bits| bits / 8).ok_or_else(|| {
            BtfError::MemberNotFound { strukt: strukt.to_string(), member: member.to_string() }
        })
    }

    /// Number of types, including the implicit `void`
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    fn find_member_bits(&self, id: usize, member: &str) -> Option<u32> {
        let ty = self.types.get(id)?;
        for m in &ty.members {
            let bits = if ty.kind_flag { m.offset & 0x00ff_ffff } else { m.offset };
            let name = self.name(m.name_off);
            if name == member {
                return Some(bits);
            }
            if name.is_empty() {
                let inner = self.resolve(m.type_id)?;
                if let Some(nested) = self.find_member_bits(inner, member) {
                    return Some(bits + nested);
                }
            }
        }
        None
    }

    /// Follow typedef/const/volatile/restrict/type_tag to the underlying type
    fn resolve(&self, mut id: u32) -> Option<usize> {
        for _ in 0..MAX_RESOLVE_DEPTH {
            let ty = self.types.get(id as usize)?;
            match ty.kind {
                KIND_TYPEDEF | KIND_VOLATILE | KIND_CONST | KIND_RESTRICT | KIND_TYPE_TAG => {
                    id = ty.size_or_type;
                }
                _ => return Some(id as usize),
            }
        }
        None
    }

    fn name(&self, off: u32) -> &str {
        let start = off as usize;
        let Some(rest) = self.strings.get(start..) else {
            return "";
        };
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        std::str::from_utf8(&rest[..end]).unwrap_or("")
    }
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, BtfError> {
    data.get(at..at + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_ne_bytes)
        .ok_or(BtfError::Truncated(at))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, BtfError> {
    data.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_ne_bytes)
        .ok_or(BtfError::Truncated(at))
}


#[cfg(test)]
mod tests {
    use super::test_blob::{BlobBuilder, CONST, FWD, INT, PTR, STRUCT, UNION};
    use super::*;

    fn sample() -> Btf {
        let mut b = BlobBuilder::new();
        let int = b.ty("int", INT, 0, false, 4);
        // forward declaration must not shadow the full definition
        b.ty("task_struct", FWD, 0, false, 0);
        let anon = b.ty("", STRUCT, 1, false, 8);
        b.member("tgid", int, 32);
        let anon_const = b.ty("", CONST, 0, false, anon);
        let task = b.ty("task_struct", STRUCT, 3, false, 64);
        b.member("real_parent", task + 1, 64);
        b.member("", anon_const, 128);
        b.member("comm", int, 256);
        b.ty("", PTR, 0, false, task);
        b.ty("fib_config", STRUCT, 2, true, 16);
        b.member("fc_dst_len", int, 8 << 24);
        b.member("fc_dst", int, 96);
        let union = b.ty("", UNION, 1, false, 4);
        b.member("inum", int, 0);
        b.ty("ns_common", STRUCT, 1, false, 8);
        b.member("", union, 32);
        Btf::parse(&b.finish()).unwrap()
    }

    #[test]
    fn test_direct_member_offsets() {
        let btf = sample();
        assert_eq!(btf.member_offset("task_struct", "real_parent").unwrap(), 8);
        assert_eq!(btf.member_offset("task_struct", "comm").unwrap(), 32);
    }

    #[test]
    fn test_member_inside_anonymous_struct() {
        let btf = sample();
        assert_eq!(btf.member_offset("task_struct", "tgid").unwrap(), 20);
        assert_eq!(btf.member_offset("ns_common", "inum").unwrap(), 4);
    }

    #[test]
    fn test_kind_flag_masks_bitfield_size() {
        let btf = sample();
        assert_eq!(btf.member_offset("fib_config", "fc_dst_len").unwrap(), 0);
        assert_eq!(btf.member_offset("fib_config", "fc_dst").unwrap(), 12);
    }

    #[test]
    fn test_missing_struct_and_member() {
        let btf = sample();
        assert_eq!(
            btf.member_offset("nsproxy", "pid_ns_for_children"),
            Err(BtfError::StructNotFound("nsproxy".to_string()))
        );
        assert!(matches!(
            btf.member_offset("task_struct", "nsproxy"),
            Err(BtfError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn test_type_count_includes_void() {
        assert_eq!(sample().type_count(), 10);
    }

    #[test]
    fn test_bad_magic() {
        let err = Btf::parse(&[0u8; 32]).unwrap_err();
        assert_eq!(err, BtfError::BadMagic(0));
    }

    #[test]
    fn test_truncated_blob() {
        let mut blob = {
            let mut b = BlobBuilder::new();
            b.ty("int", INT, 0, false, 4);
            b.finish()
        };
        blob.truncate(30);
        assert!(matches!(Btf::parse(&blob), Err(BtfError::Truncated(_))));
    }
}
