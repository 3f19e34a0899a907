//! The mutable document handle shared by the remediation pipeline.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::objects::{dict_get, dict_get_dict, rect, reference, resolve};
use crate::detect::detect_format_from_bytes;
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;

/// US Letter, used when no MediaBox can be found in the page tree.
const DEFAULT_PAGE_BOX: BoundingBox = BoundingBox {
    x: 0.0,
    y: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Inheritable page attributes are looked up at most this many levels up.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// A loaded PDF plus the lookup tables the pipeline builds while mutating it.
///
/// Handlers receive the handle by value and return it; nothing else is shared
/// between them.
pub struct DocumentHandle {
    doc: Document,
    /// Declared structure-node id → structure element object.
    structure_ids: BTreeMap<String, ObjectId>,
    compress: bool,
}

impl DocumentHandle {
    /// Load a document from bytes.
    pub fn load(data: &[u8]) -> Result<Self> {
        detect_format_from_bytes(data)?;
        let doc = Document::load_mem(data).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::from(e),
        })?;
        if doc.is_encrypted() {
            return Err(Error::Encrypted);
        }
        log::debug!(
            "Loaded PDF {} with {} pages",
            doc.version,
            doc.get_pages().len()
        );
        Ok(Self::from_document(doc))
    }

    /// Wrap an already loaded document.
    pub fn from_document(doc: Document) -> Self {
        Self {
            doc,
            structure_ids: BTreeMap::new(),
            compress: true,
        }
    }

    /// Choose whether authored streams are Flate-compressed.
    pub fn set_compress(&mut self, compress: bool) {
        self.compress = compress;
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Serialize the document, dropping objects no longer reachable.
    pub fn save(&mut self) -> Result<Vec<u8>> {
        let pruned = self.doc.prune_objects();
        if !pruned.is_empty() {
            log::debug!("Pruned {} unreachable objects", pruned.len());
        }
        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        Ok(output)
    }

    // -- Pages ----------------------------------------------------------------

    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// Object id of a 1-indexed page.
    pub fn page_id(&self, page: u32) -> Result<ObjectId> {
        let pages = self.doc.get_pages();
        pages
            .get(&page)
            .copied()
            .ok_or(Error::PageOutOfRange(page, pages.len() as u32))
    }

    /// 1-indexed page number of a page object.
    pub fn page_number(&self, page_id: ObjectId) -> Option<u32> {
        page_number(&self.doc, page_id)
    }

    /// The page's MediaBox (inherited if needed).
    pub fn page_box(&self, page_id: ObjectId) -> BoundingBox {
        page_box(&self.doc, page_id)
    }

    /// The page's resource dictionary (inherited if needed), cloned.
    pub fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        page_resources(&self.doc, page_id).cloned().unwrap_or_default()
    }

    /// Decoded operations of all content streams of a page, in order.
    pub fn page_operations(&self, page_id: ObjectId) -> Result<Vec<Operation>> {
        let content = page_content(&self.doc, page_id)?;
        let content = Content::decode(&content).map_err(|e| Error::Content(e.to_string()))?;
        Ok(content.operations)
    }

    /// Replace a page's content with the given operations in a single stream.
    pub fn set_page_operations(&mut self, page_id: ObjectId, operations: Vec<Operation>) -> Result<()> {
        let bytes = Content { operations }
            .encode()
            .map_err(|e| Error::Content(e.to_string()))?;
        let stream = self.content_stream(bytes);
        let stream_id = self.doc.add_object(stream);
        let page = self.doc.get_dictionary_mut(page_id)?;
        page.set("Contents", Object::Reference(stream_id));
        Ok(())
    }

    /// Append a content stream to a page, bracketing the existing content in
    /// `q`/`Q` so its graphics state cannot leak into the new stream.
    pub fn append_page_content(&mut self, page_id: ObjectId, bytes: Vec<u8>) -> Result<()> {
        let existing: Vec<Object> = {
            let page = self.doc.get_dictionary(page_id)?;
            match page.get(b"Contents") {
                Ok(Object::Array(items)) => items.clone(),
                Ok(obj @ Object::Reference(_)) => vec![obj.clone()],
                _ => Vec::new(),
            }
        };

        let mut contents = Vec::with_capacity(existing.len() + 2);
        if !existing.is_empty() {
            let open = self.doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            contents.push(Object::Reference(open));
            contents.extend(existing);
        }
        let mut tail = if contents.is_empty() {
            Vec::new()
        } else {
            b"Q\n".to_vec()
        };
        tail.extend_from_slice(&bytes);
        let tail = self.content_stream(tail);
        let tail_id = self.doc.add_object(tail);
        contents.push(Object::Reference(tail_id));

        let page = self.doc.get_dictionary_mut(page_id)?;
        page.set("Contents", Object::Array(contents));
        Ok(())
    }

    /// Build a content stream, Flate-compressed unless disabled.
    pub fn content_stream(&self, bytes: Vec<u8>) -> Stream {
        if self.compress {
            match deflate(&bytes) {
                Ok(compressed) => {
                    return Stream::new(dictionary! { "Filter" => "FlateDecode" }, compressed)
                }
                Err(e) => log::warn!("Stream compression failed, writing plain: {}", e),
            }
        }
        Stream::new(dictionary! {}, bytes)
    }

    // -- Catalog and info -----------------------------------------------------

    pub fn catalog_id(&self) -> Result<ObjectId> {
        self.doc
            .trailer
            .get(b"Root")
            .ok()
            .and_then(reference)
            .ok_or_else(|| Error::MissingObject("document catalog".to_string()))
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        let id = self.catalog_id()?;
        Ok(self.doc.get_dictionary(id)?)
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = self.catalog_id()?;
        Ok(self.doc.get_dictionary_mut(id)?)
    }

    /// The document information dictionary, created if absent.
    pub fn info_mut(&mut self) -> Result<&mut Dictionary> {
        let existing = self.doc.trailer.get(b"Info").ok().and_then(reference);
        let id = match existing {
            Some(id) if self.doc.get_dictionary(id).is_ok() => id,
            _ => {
                let inline = match self.doc.trailer.get(b"Info") {
                    Ok(Object::Dictionary(dict)) => dict.clone(),
                    _ => Dictionary::new(),
                };
                let id = self.doc.add_object(inline);
                self.doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };
        Ok(self.doc.get_dictionary_mut(id)?)
    }

    /// Make `dict[key]` an indirect dictionary and return its id.
    ///
    /// Direct dictionaries are moved into new objects; a missing entry gets a
    /// fresh empty dictionary. `owner` is the object holding `dict`.
    pub fn ensure_indirect_dict(&mut self, owner: ObjectId, key: &[u8]) -> Result<ObjectId> {
        let current = self.doc.get_dictionary(owner)?.get(key).ok().cloned();
        match current {
            Some(Object::Reference(id)) if self.doc.get_dictionary(id).is_ok() => Ok(id),
            Some(Object::Dictionary(dict)) => {
                let id = self.doc.add_object(dict);
                self.doc
                    .get_dictionary_mut(owner)?
                    .set(key.to_vec(), Object::Reference(id));
                Ok(id)
            }
            _ => {
                let id = self.doc.add_object(Dictionary::new());
                self.doc
                    .get_dictionary_mut(owner)?
                    .set(key.to_vec(), Object::Reference(id));
                Ok(id)
            }
        }
    }

    /// The array stored at `dict[key]`, direct or behind one reference,
    /// created empty when missing or of another type.
    pub fn array_entry_mut(&mut self, owner: ObjectId, key: &[u8]) -> Result<&mut Vec<Object>> {
        let existing = match self.doc.get_dictionary(owner)?.get(key) {
            Ok(Object::Reference(id)) if matches!(self.doc.get_object(*id), Ok(Object::Array(_))) => {
                Some(Some(*id))
            }
            Ok(Object::Array(_)) => Some(None),
            _ => None,
        };
        let target = match existing {
            Some(target) => target,
            None => {
                self.doc
                    .get_dictionary_mut(owner)?
                    .set(key.to_vec(), Object::Array(Vec::new()));
                None
            }
        };
        let slot = match target {
            Some(id) => self.doc.get_object_mut(id)?,
            None => self.doc.get_dictionary_mut(owner)?.get_mut(key)?,
        };
        match slot {
            Object::Array(items) => Ok(items),
            _ => Err(Error::MissingObject(format!(
                "array /{}",
                String::from_utf8_lossy(key)
            ))),
        }
    }

    /// Object id of the page-tree node that carries the page's Resources,
    /// moving inherited or direct resources into an object owned by the page.
    pub fn page_resources_id(&mut self, page_id: ObjectId) -> Result<ObjectId> {
        let has_own = self.doc.get_dictionary(page_id)?.has(b"Resources");
        if !has_own {
            let inherited = self.page_resources(page_id);
            self.doc
                .get_dictionary_mut(page_id)?
                .set("Resources", Object::Dictionary(inherited));
        }
        self.ensure_indirect_dict(page_id, b"Resources")
    }

    // -- Structure ids --------------------------------------------------------

    /// Record the element built for a declared structure node.
    pub fn register_structure_node(&mut self, id: impl Into<String>, element: ObjectId) {
        self.structure_ids.insert(id.into(), element);
    }

    /// Element built for a declared structure node.
    pub fn structure_node(&self, id: &str) -> Result<ObjectId> {
        self.structure_ids
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownNode(id.to_string()))
    }

    pub fn structure_node_ids(&self) -> &BTreeMap<String, ObjectId> {
        &self.structure_ids
    }

    pub fn clear_structure_nodes(&mut self) {
        self.structure_ids.clear();
    }
}

/// 1-indexed page number of a page object.
pub fn page_number(doc: &Document, page_id: ObjectId) -> Option<u32> {
    doc.get_pages()
        .into_iter()
        .find(|(_, id)| *id == page_id)
        .map(|(number, _)| number)
}

/// Look up an inheritable page attribute, walking `/Parent` links.
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Some(value) = dict_get(doc, node, key) {
            return Some(value);
        }
        node = dict_get_dict(doc, node, b"Parent")?;
    }
    None
}

/// The page's MediaBox, falling back to US Letter.
pub fn page_box(doc: &Document, page_id: ObjectId) -> BoundingBox {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| rect(doc, obj))
        .unwrap_or(DEFAULT_PAGE_BOX)
}

/// The page's resource dictionary (inherited if needed).
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    match inherited(doc, page_id, b"Resources")? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Concatenated, decompressed bytes of a page's content streams.
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc.get_dictionary(page_id)?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let mut content = Vec::new();
    let streams: Vec<&Object> = match resolve(doc, contents) {
        Object::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for obj in streams {
        match resolve(doc, obj) {
            Object::Stream(stream) => {
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                content.extend_from_slice(&data);
                content.push(b'\n');
            }
            Object::Null => {}
            _ => return Err(Error::PdfParse("Invalid content stream".to_string())),
        }
    }
    Ok(content)
}

/// Zlib-compress bytes for a `/FlateDecode` stream.
pub fn deflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
