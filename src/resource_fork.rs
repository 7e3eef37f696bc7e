use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::error::{FourCC, LoadError, LoadResult};
use crate::records::Endian;

const HEADER_LEN: usize = 16;
const MAP_HEADER_LEN: usize = 28;
const TYPE_ENTRY_LEN: usize = 8;
const REF_ENTRY_LEN: usize = 12;
const DATA_START: usize = 256;

/// Location of one resource payload inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub id: i16,
    pub name: Option<String>,
    pub attributes: u8,
    pub offset: usize,
    pub size: usize,
}

/// In-memory representation of a resource fork.
///
/// Resources are looked up through a two-level table keyed first by type tag
/// and then by id, so no id arithmetic is needed to tell records apart.
#[derive(Debug, Clone)]
pub struct ResourceFork {
    label: String,
    data: Arc<[u8]>,
    types: HashMap<FourCC, BTreeMap<i16, ResourceEntry>>,
}

impl ResourceFork {
    /// Reads a resource fork from disk and indexes every resource.
    pub fn open<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let path_buf: PathBuf = path.as_ref().to_path_buf();
        let mut file = File::open(&path_buf)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Self::from_bytes(path_buf.display().to_string(), data)
    }

    /// Indexes a resource fork already resident in memory.
    pub fn from_bytes(label: impl Into<String>, data: Vec<u8>) -> LoadResult<Self> {
        let label = label.into();
        let storage: Arc<[u8]> = Arc::from(data.into_boxed_slice());
        let types = parse_resource_map(&storage)?;
        debug!(
            "indexed {} resource type(s) in {}",
            types.len(),
            label
        );
        Ok(Self {
            label,
            data: storage,
            types,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the payload of a resource if present.
    pub fn get(&self, tag: FourCC, id: i16) -> Option<&[u8]> {
        let entry = self.types.get(&tag)?.get(&id)?;
        Some(&self.data[entry.offset..entry.offset + entry.size])
    }

    /// Returns the payload of a resource that must be present.
    pub fn require(&self, tag: FourCC, id: i16) -> LoadResult<&[u8]> {
        self.get(tag, id)
            .ok_or(LoadError::MissingResource { tag, id })
    }

    pub fn entry(&self, tag: FourCC, id: i16) -> Option<&ResourceEntry> {
        self.types.get(&tag)?.get(&id)
    }

    pub fn name(&self, tag: FourCC, id: i16) -> Option<&str> {
        self.entry(tag, id)?.name.as_deref()
    }

    pub fn contains(&self, tag: FourCC, id: i16) -> bool {
        self.entry(tag, id).is_some()
    }

    /// Returns the ids stored under a tag in ascending order.
    pub fn ids(&self, tag: FourCC) -> Vec<i16> {
        self.types
            .get(&tag)
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn tags(&self) -> Vec<FourCC> {
        let mut tags: Vec<FourCC> = self.types.keys().copied().collect();
        tags.sort();
        tags
    }

    /// Total number of resources across all types.
    pub fn len(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn invalid(message: impl Into<String>) -> LoadError {
    LoadError::InvalidContainer(message.into())
}

fn read_u16(data: &[u8], at: usize) -> LoadResult<u16> {
    let bytes = data
        .get(at..at + 2)
        .ok_or_else(|| invalid(format!("unexpected end of container reading 16-bit value at {at}")))?;
    Ok(Endian::Big.decode_u16([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> LoadResult<u32> {
    let bytes = data
        .get(at..at + 4)
        .ok_or_else(|| invalid(format!("unexpected end of container reading 32-bit value at {at}")))?;
    Ok(Endian::Big.decode_u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn check_range(what: &str, start: usize, len: usize, limit: usize) -> LoadResult<()> {
    if start
        .checked_add(len)
        .filter(|end| *end <= limit)
        .is_none()
    {
        return Err(invalid(format!(
            "{what} extends past container bounds (offset={start}, size={len}, len={limit})"
        )));
    }
    Ok(())
}

fn parse_resource_map(data: &[u8]) -> LoadResult<HashMap<FourCC, BTreeMap<i16, ResourceEntry>>> {
    if data.len() < HEADER_LEN {
        return Err(invalid(format!(
            "container too small to contain header (len={})",
            data.len()
        )));
    }

    let data_offset = read_u32(data, 0)? as usize;
    let map_offset = read_u32(data, 4)? as usize;
    let data_len = read_u32(data, 8)? as usize;
    let map_len = read_u32(data, 12)? as usize;

    check_range("resource data", data_offset, data_len, data.len())?;
    check_range("resource map", map_offset, map_len, data.len())?;
    if map_len < MAP_HEADER_LEN {
        return Err(invalid(format!("resource map too small (len={map_len})")));
    }

    let map = &data[map_offset..map_offset + map_len];
    let type_list_offset = read_u16(map, 24)? as usize;
    let name_list_offset = read_u16(map, 26)? as usize;
    if type_list_offset + 2 > map.len() {
        return Err(invalid(format!(
            "type list offset {type_list_offset} outside resource map"
        )));
    }

    let raw_type_count = read_u16(map, type_list_offset)?;
    let num_types = if raw_type_count == 0xffff {
        0
    } else {
        raw_type_count as usize + 1
    };

    let resource_data = &data[data_offset..data_offset + data_len];
    let mut types: HashMap<FourCC, BTreeMap<i16, ResourceEntry>> = HashMap::new();

    for t in 0..num_types {
        let entry_at = type_list_offset + 2 + t * TYPE_ENTRY_LEN;
        check_range("type list entry", entry_at, TYPE_ENTRY_LEN, map.len())?;
        let tag = FourCC([
            map[entry_at],
            map[entry_at + 1],
            map[entry_at + 2],
            map[entry_at + 3],
        ]);
        let count = read_u16(map, entry_at + 4)? as usize + 1;
        let ref_list_at = type_list_offset + read_u16(map, entry_at + 6)? as usize;

        let entries = types.entry(tag).or_default();
        for r in 0..count {
            let ref_at = ref_list_at + r * REF_ENTRY_LEN;
            check_range("reference list entry", ref_at, REF_ENTRY_LEN, map.len())?;
            let id = read_u16(map, ref_at)? as i16;
            let name_offset = read_u16(map, ref_at + 2)?;
            let attr_and_offset = read_u32(map, ref_at + 4)?;
            let attributes = (attr_and_offset >> 24) as u8;
            let payload_at = (attr_and_offset & 0x00ff_ffff) as usize;

            let size = read_u32(resource_data, payload_at)? as usize;
            check_range(
                &format!("resource '{tag}' #{id}"),
                payload_at + 4,
                size,
                resource_data.len(),
            )?;

            let name = if name_offset == 0xffff {
                None
            } else {
                Some(read_name(map, name_list_offset + name_offset as usize)?)
            };

            if entries
                .insert(
                    id,
                    ResourceEntry {
                        id,
                        name,
                        attributes,
                        offset: data_offset + payload_at + 4,
                        size,
                    },
                )
                .is_some()
            {
                return Err(invalid(format!("duplicate resource '{tag}' #{id}")));
            }
        }
    }

    Ok(types)
}

fn read_name(map: &[u8], at: usize) -> LoadResult<String> {
    let len = *map
        .get(at)
        .ok_or_else(|| invalid(format!("resource name offset {at} outside map")))? as usize;
    check_range("resource name", at + 1, len, map.len())?;
    Ok(String::from_utf8_lossy(&map[at + 1..at + 1 + len]).into_owned())
}

struct PendingResource {
    id: i16,
    name: Option<String>,
    data: Vec<u8>,
}

/// Builds a resource fork byte-for-byte in the classic layout.
#[derive(Default)]
pub struct ResourceForkWriter {
    types: BTreeMap<FourCC, Vec<PendingResource>>,
}

impl ResourceForkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource, replacing any earlier one with the same tag and id.
    pub fn add(&mut self, tag: FourCC, id: i16, name: Option<&str>, data: Vec<u8>) -> &mut Self {
        let list = self.types.entry(tag).or_default();
        list.retain(|res| res.id != id);
        list.push(PendingResource {
            id,
            name: name.map(str::to_string),
            data,
        });
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data_section = Vec::new();
        let mut names = Vec::new();
        let mut type_list = Vec::new();
        let mut ref_lists = Vec::new();

        let num_types = self.types.len();
        let type_list_len = 2 + num_types * TYPE_ENTRY_LEN;
        let type_count_field = if num_types == 0 {
            0xffff
        } else {
            (num_types - 1) as u16
        };
        type_list.extend_from_slice(&Endian::Big.encode_u16(type_count_field));

        for (tag, resources) in &self.types {
            let ref_list_offset = type_list_len + ref_lists.len();
            type_list.extend_from_slice(&tag.0);
            type_list.extend_from_slice(&Endian::Big.encode_u16((resources.len() - 1) as u16));
            type_list.extend_from_slice(&Endian::Big.encode_u16(ref_list_offset as u16));

            for res in resources {
                let name_offset = match &res.name {
                    Some(name) => {
                        let offset = names.len() as u16;
                        let bytes = name.as_bytes();
                        let len = bytes.len().min(255);
                        names.push(len as u8);
                        names.extend_from_slice(&bytes[..len]);
                        offset
                    }
                    None => 0xffff,
                };
                let payload_offset = data_section.len() as u32;
                data_section.extend_from_slice(&Endian::Big.encode_u32(res.data.len() as u32));
                data_section.extend_from_slice(&res.data);

                ref_lists.extend_from_slice(&Endian::Big.encode_u16(res.id as u16));
                ref_lists.extend_from_slice(&Endian::Big.encode_u16(name_offset));
                ref_lists.extend_from_slice(&Endian::Big.encode_u32(payload_offset & 0x00ff_ffff));
                ref_lists.extend_from_slice(&[0u8; 4]);
            }
        }

        let type_list_offset = MAP_HEADER_LEN;
        let name_list_offset = type_list_offset + type_list.len() + ref_lists.len();
        let map_len = name_list_offset + names.len();
        let data_offset = DATA_START;
        let map_offset = data_offset + data_section.len();

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&Endian::Big.encode_u32(data_offset as u32));
        header.extend_from_slice(&Endian::Big.encode_u32(map_offset as u32));
        header.extend_from_slice(&Endian::Big.encode_u32(data_section.len() as u32));
        header.extend_from_slice(&Endian::Big.encode_u32(map_len as u32));

        let mut out = Vec::with_capacity(map_offset + map_len);
        out.extend_from_slice(&header);
        out.resize(DATA_START, 0);
        out.extend_from_slice(&data_section);

        out.extend_from_slice(&header);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&Endian::Big.encode_u16(type_list_offset as u16));
        out.extend_from_slice(&Endian::Big.encode_u16(name_list_offset as u16));
        out.extend_from_slice(&type_list);
        out.extend_from_slice(&ref_lists);
        out.extend_from_slice(&names);
        out
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    const HEDR: FourCC = FourCC::new(b"Hedr");
    const BONE: FourCC = FourCC::new(b"Bone");

    fn sample_writer() -> ResourceForkWriter {
        let mut writer = ResourceForkWriter::new();
        writer
            .add(HEDR, 1000, Some("header"), vec![1, 2, 3, 4])
            .add(BONE, 1000, None, vec![9; 10])
            .add(BONE, 1001, Some("Head"), vec![])
            .add(BONE, 1002, None, vec![7]);
        writer
    }

    #[test]
    fn round_trips_resources_and_names() {
        let fork = ResourceFork::from_bytes("memory", sample_writer().to_bytes()).unwrap();
        assert_eq!(fork.len(), 4);
        assert_eq!(fork.get(HEDR, 1000), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(fork.name(HEDR, 1000), Some("header"));
        assert_eq!(fork.name(BONE, 1001), Some("Head"));
        assert_eq!(fork.name(BONE, 1000), None);
        assert_eq!(fork.get(BONE, 1001), Some(&[][..]));
        assert_eq!(fork.ids(BONE), vec![1000, 1001, 1002]);
        assert_eq!(fork.tags(), vec![BONE, HEDR]);
    }

    #[test]
    fn require_reports_missing_resource() {
        let fork = ResourceFork::from_bytes("memory", sample_writer().to_bytes()).unwrap();
        match fork.require(BONE, 1003) {
            Err(LoadError::MissingResource { tag, id }) => {
                assert_eq!(tag, BONE);
                assert_eq!(id, 1003);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn empty_fork_has_no_types() {
        let fork = ResourceFork::from_bytes("empty", ResourceForkWriter::new().to_bytes()).unwrap();
        assert!(fork.is_empty());
        assert!(fork.tags().is_empty());
    }

    #[test]
    fn open_reads_from_disk() {
        let mut tmp = NamedTempFile::new().expect("tmp file");
        tmp.write_all(&sample_writer().to_bytes()).expect("write fork");
        let fork = ResourceFork::open(tmp.path()).unwrap();
        assert_eq!(fork.get(BONE, 1002), Some(&[7u8][..]));
    }

    #[test]
    fn rejects_truncated_container() {
        let mut bytes = sample_writer().to_bytes();
        bytes.truncate(bytes.len() - 20);
        assert!(matches!(
            ResourceFork::from_bytes("cut", bytes),
            Err(LoadError::InvalidContainer(_))
        ));
        assert!(ResourceFork::from_bytes("tiny", vec![0; 8]).is_err());
    }

    #[test]
    fn rejects_payload_length_past_data_section() {
        let mut bytes = sample_writer().to_bytes();
        // first payload length lives at the start of the data section
        bytes[DATA_START..DATA_START + 4].copy_from_slice(&Endian::Big.encode_u32(0x00ff_0000));
        assert!(ResourceFork::from_bytes("corrupt", bytes).is_err());
    }
}
