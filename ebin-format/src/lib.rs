//! The EBIN component container.
//!
//! An EBIN file is a fixed 60-byte header, a relocation table, a code blob,
//! and a data blob, laid out back to back and addressed by file offsets
//! stored in the header. This crate only knows about that layout: it does
//! not compile anything, link anything, or look inside an ELF. See the
//! `ebin-builder` crate for the pipeline that produces the pieces this
//! crate serializes.

use std::fmt;

use thiserror::Error;

/// `"EBIN"`, matching the container's fixed magic number.
pub const MAGIC: u32 = 0x4e49_4245;
/// The only container version this crate understands.
pub const VERSION: u16 = 1;
/// Size in bytes of the fixed header. Every EBIN file starts with exactly this many bytes.
pub const HEADER_SIZE: usize = 60;
/// Size in bytes of a single relocation table entry.
pub const RELOC_ENTRY_SIZE: usize = 8;

bitflags::bitflags! {
    /// Bits stored in the header's `flags` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// The component was built with debug info (`-g`, no stripping).
        const DEBUG = 1 << 1;
    }
}

/// The kind of component an EBIN file carries. Stored as the header's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ComponentType {
    Cpu = 1,
    Video = 2,
    Audio = 3,
    Io = 4,
}

impl ComponentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Cpu => "cpu",
            ComponentType::Video => "video",
            ComponentType::Audio => "audio",
            ComponentType::Io => "io",
        }
    }
}

impl std::str::FromStr for ComponentType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(ComponentType::Cpu),
            "video" => Ok(ComponentType::Video),
            "audio" => Ok(ComponentType::Audio),
            "io" => Ok(ComponentType::Io),
            other => Err(FormatError::InvalidComponentType(other.to_string())),
        }
    }
}

impl TryFrom<u16> for ComponentType {
    type Error = FormatError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ComponentType::Cpu),
            2 => Ok(ComponentType::Video),
            3 => Ok(ComponentType::Audio),
            4 => Ok(ComponentType::Io),
            other => Err(FormatError::InvalidComponentType(other.to_string())),
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which blob a relocation's offset is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelocSection {
    Code = 0,
    Data = 1,
}

impl TryFrom<u8> for RelocSection {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RelocSection::Code),
            1 => Ok(RelocSection::Data),
            other => Err(FormatError::InvalidSection(other)),
        }
    }
}

/// How a relocation's target word should be interpreted. The builder only ever emits
/// [`RelocType::Absolute`]; the other variants exist because the on-disk format reserves
/// room for a loader that understands more relocation kinds than this CORE produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelocType {
    Absolute = 0,
    Relative = 1,
    High16 = 2,
    Low16 = 3,
}

impl TryFrom<u8> for RelocType {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RelocType::Absolute),
            1 => Ok(RelocType::Relative),
            2 => Ok(RelocType::High16),
            3 => Ok(RelocType::Low16),
            other => Err(FormatError::InvalidRelocType(other)),
        }
    }
}

/// A single entry in the relocation table: one word the loader must rewrite after
/// placing the component at its runtime base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocEntry {
    /// Byte offset inside the blob named by `section`.
    pub offset: u32,
    pub reloc_type: RelocType,
    pub section: RelocSection,
}

impl RelocEntry {
    pub fn absolute(offset: u32, section: RelocSection) -> Self {
        RelocEntry {
            offset,
            reloc_type: RelocType::Absolute,
            section,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.push(self.reloc_type as u8);
        out.push(self.section as u8);
        out.extend_from_slice(&[0u8; 2]);
    }

    fn read_from(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < RELOC_ENTRY_SIZE {
            return Err(FormatError::Truncated {
                what: "relocation entry",
                needed: RELOC_ENTRY_SIZE,
                have: bytes.len(),
            });
        }
        let offset = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let reloc_type = RelocType::try_from(bytes[4])?;
        let section = RelocSection::try_from(bytes[5])?;
        Ok(RelocEntry {
            offset,
            reloc_type,
            section,
        })
    }
}

/// The fixed 60-byte header that opens every EBIN file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub component_type: ComponentType,
    pub flags: Flags,
    pub code_size: u32,
    pub data_size: u32,
    pub bss_size: u32,
    pub entry_offset: u32,
    pub interface_version: u32,
    pub min_ram: u32,
    pub reloc_count: u32,
    pub reloc_offset: u32,
    pub code_offset: u32,
    pub data_offset: u32,
}

impl Header {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(self.component_type as u16).to_le_bytes());
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out.extend_from_slice(&self.code_size.to_le_bytes());
        out.extend_from_slice(&self.data_size.to_le_bytes());
        out.extend_from_slice(&self.bss_size.to_le_bytes());
        out.extend_from_slice(&self.entry_offset.to_le_bytes());
        out.extend_from_slice(&self.interface_version.to_le_bytes());
        out.extend_from_slice(&self.min_ram.to_le_bytes());
        out.extend_from_slice(&self.reloc_count.to_le_bytes());
        out.extend_from_slice(&self.reloc_offset.to_le_bytes());
        out.extend_from_slice(&self.code_offset.to_le_bytes());
        out.extend_from_slice(&self.data_offset.to_le_bytes());
        // symbol_offset, symbol_count: reserved, always zero.
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                what: "header",
                needed: HEADER_SIZE,
                have: bytes.len(),
            });
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let component_type = ComponentType::try_from(u16::from_le_bytes(
            bytes[6..8].try_into().unwrap(),
        ))?;
        let flags = Flags::from_bits_truncate(u32::from_le_bytes(bytes[8..12].try_into().unwrap()));
        let code_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let data_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let bss_size = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
        let entry_offset = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
        let interface_version = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        let min_ram = u32::from_le_bytes(bytes[32..36].try_into().unwrap());
        let reloc_count = u32::from_le_bytes(bytes[36..40].try_into().unwrap());
        let reloc_offset = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        let code_offset = u32::from_le_bytes(bytes[44..48].try_into().unwrap());
        let data_offset = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
        // bytes[52..56] = symbol_offset, bytes[56..60] = symbol_count: reserved.

        Ok(Header {
            component_type,
            flags,
            code_size,
            data_size,
            bss_size,
            entry_offset,
            interface_version,
            min_ram,
            reloc_count,
            reloc_offset,
            code_offset,
            data_offset,
        })
    }
}

/// Caller-supplied fields that end up verbatim in the header.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub component_type: ComponentType,
    pub interface_version: u32,
    pub min_ram: u32,
    pub debug: bool,
}

/// A fully assembled EBIN file, in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub header: Header,
    pub relocations: Vec<RelocEntry>,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
}

impl Container {
    /// Lay out `code`, `data`, and `relocations` into a [`Container`], padding `code`
    /// to a 4-byte boundary since the pad lives inside the code blob.
    pub fn build(
        mut code: Vec<u8>,
        data: Vec<u8>,
        bss_size: u32,
        entry_offset: u32,
        relocations: Vec<RelocEntry>,
        config: ContainerConfig,
    ) -> Self {
        let pad = (4 - (code.len() % 4)) % 4;
        code.resize(code.len() + pad, 0);

        let reloc_offset = HEADER_SIZE as u32;
        let reloc_count = relocations.len() as u32;
        let code_offset = reloc_offset + reloc_count * RELOC_ENTRY_SIZE as u32;
        let data_offset = code_offset + code.len() as u32;

        let mut flags = Flags::empty();
        if config.debug {
            flags |= Flags::DEBUG;
        }

        let header = Header {
            component_type: config.component_type,
            flags,
            code_size: code.len() as u32,
            data_size: data.len() as u32,
            bss_size,
            entry_offset,
            interface_version: config.interface_version,
            min_ram: config.min_ram,
            reloc_count,
            reloc_offset,
            code_offset,
            data_offset,
        };

        Container {
            header,
            relocations,
            code,
            data,
        }
    }

    /// Serialize to the on-disk byte stream: `header ‖ relocation_table ‖ code ‖ data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE + self.relocations.len() * RELOC_ENTRY_SIZE + self.code.len() + self.data.len(),
        );
        self.header.write_to(&mut out);
        for reloc in &self.relocations {
            reloc.write_to(&mut out);
        }
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse a full EBIN byte stream back into a [`Container`], validating the header,
    /// the relocation table entries, and that the byte stream has no trailing or
    /// missing bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let header = Header::read_from(bytes)?;

        let reloc_end = header.reloc_offset as usize
            + header.reloc_count as usize * RELOC_ENTRY_SIZE;
        if header.reloc_offset as usize != HEADER_SIZE {
            return Err(FormatError::Inconsistent(
                "reloc_offset must equal the header size",
            ));
        }
        if header.code_offset as usize != reloc_end {
            return Err(FormatError::Inconsistent(
                "code_offset must immediately follow the relocation table",
            ));
        }
        if header.code_size % 4 != 0 {
            return Err(FormatError::Inconsistent("code_size must be 4-byte aligned"));
        }
        if header.entry_offset >= header.code_size {
            return Err(FormatError::Inconsistent("entry_offset must be inside the code blob"));
        }
        let data_start = header.code_offset as usize + header.code_size as usize;
        if header.data_offset as usize != data_start {
            return Err(FormatError::Inconsistent(
                "data_offset must immediately follow the code blob",
            ));
        }
        let data_end = data_start + header.data_size as usize;

        if bytes.len() < data_end {
            return Err(FormatError::Truncated {
                what: "container body",
                needed: data_end,
                have: bytes.len(),
            });
        }
        if bytes.len() != data_end {
            return Err(FormatError::Inconsistent(
                "trailing bytes after the data blob",
            ));
        }

        let mut relocations = Vec::with_capacity(header.reloc_count as usize);
        for i in 0..header.reloc_count as usize {
            let start = header.reloc_offset as usize + i * RELOC_ENTRY_SIZE;
            let entry = RelocEntry::read_from(&bytes[start..])?;
            let blob_size = match entry.section {
                RelocSection::Code => header.code_size,
                RelocSection::Data => header.data_size,
            };
            if entry.offset % 4 != 0 {
                return Err(FormatError::Misaligned(entry.offset));
            }
            if entry.offset.checked_add(4).map_or(true, |end| end > blob_size) {
                return Err(FormatError::OutOfBounds {
                    offset: entry.offset,
                    blob_size,
                });
            }
            relocations.push(entry);
        }

        let code = bytes[header.code_offset as usize..data_start].to_vec();
        let data = bytes[data_start..data_end].to_vec();

        Ok(Container {
            header,
            relocations,
            code,
            data,
        })
    }
}

/// Errors produced while parsing or validating an EBIN container.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad magic number: {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported container version: {0}")]
    UnsupportedVersion(u16),
    #[error("invalid component type: {0}")]
    InvalidComponentType(String),
    #[error("invalid relocation type: {0}")]
    InvalidRelocType(u8),
    #[error("invalid relocation section: {0}")]
    InvalidSection(u8),
    #[error("truncated {what}: needed at least {needed} bytes, have {have}")]
    Truncated {
        what: &'static str,
        needed: usize,
        have: usize,
    },
    #[error("relocation offset {0} is not 4-byte aligned")]
    Misaligned(u32),
    #[error("relocation offset {offset} does not fit inside its {blob_size}-byte blob")]
    OutOfBounds { offset: u32, blob_size: u32 },
    #[error("malformed container: {0}")]
    Inconsistent(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ContainerConfig {
        ContainerConfig {
            component_type: ComponentType::Cpu,
            interface_version: 0x0001_0000,
            min_ram: 4096,
            debug: false,
        }
    }

    #[test]
    fn header_is_exactly_60_bytes() {
        let container = Container::build(vec![0u8; 4], vec![], 0, 0, vec![], sample_config());
        let bytes = container.to_bytes();
        assert_eq!(&bytes[0..4], &MAGIC.to_le_bytes());
        assert_eq!(u16::from_le_bytes(bytes[4..6].try_into().unwrap()), VERSION);
        assert_eq!(container.header.reloc_offset, HEADER_SIZE as u32);
    }

    #[test]
    fn offsets_are_monotonic_and_code_is_padded() {
        let relocations = vec![RelocEntry::absolute(0, RelocSection::Data)];
        let container = Container::build(
            vec![1, 2, 3], // 3 bytes -> padded to 4
            vec![0u8; 4],
            0,
            0,
            relocations,
            sample_config(),
        );
        assert_eq!(container.code.len(), 4);
        assert_eq!(container.header.code_size % 4, 0);
        assert_eq!(container.header.reloc_offset, HEADER_SIZE as u32);
        assert_eq!(
            container.header.code_offset,
            HEADER_SIZE as u32 + RELOC_ENTRY_SIZE as u32
        );
        assert_eq!(
            container.header.data_offset,
            container.header.code_offset + container.header.code_size
        );
        let bytes = container.to_bytes();
        assert_eq!(bytes.len(), container.header.data_offset as usize + container.data.len());
    }

    #[test]
    fn roundtrip_parse_consumes_the_whole_file() {
        let relocations = vec![
            RelocEntry::absolute(0, RelocSection::Data),
            RelocEntry::absolute(4, RelocSection::Data),
        ];
        let container = Container::build(
            vec![0x13, 0x00, 0x00, 0x00],
            vec![7, 0, 0, 0, 9, 0, 0, 0],
            16,
            0,
            relocations,
            sample_config(),
        );
        let bytes = container.to_bytes();
        let parsed = Container::parse(&bytes).expect("roundtrip parse should succeed");
        assert_eq!(parsed, container);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(Container::parse(&bytes), Err(FormatError::BadMagic(0))));
    }

    #[test]
    fn rejects_unaligned_relocation_offset() {
        let relocations = vec![RelocEntry::absolute(1, RelocSection::Data)];
        let container = Container::build(vec![0; 4], vec![0; 4], 0, 0, relocations, sample_config());
        let bytes = container.to_bytes();
        assert!(matches!(Container::parse(&bytes), Err(FormatError::Misaligned(1))));
    }

    #[test]
    fn rejects_out_of_bounds_relocation() {
        let relocations = vec![RelocEntry::absolute(4, RelocSection::Data)];
        let container = Container::build(vec![0; 4], vec![0; 4], 0, 0, relocations, sample_config());
        let bytes = container.to_bytes();
        assert!(matches!(
            Container::parse(&bytes),
            Err(FormatError::OutOfBounds { offset: 4, blob_size: 4 })
        ));
    }

    #[test]
    fn debug_flag_round_trips() {
        let mut config = sample_config();
        config.debug = true;
        let container = Container::build(vec![0; 4], vec![], 0, 0, vec![], config);
        assert!(container.header.flags.contains(Flags::DEBUG));
        let bytes = container.to_bytes();
        let parsed = Container::parse(&bytes).unwrap();
        assert!(parsed.header.flags.contains(Flags::DEBUG));
    }
}
