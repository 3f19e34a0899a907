//! Document-level metadata: language, title, viewer preferences, the
//! MarkInfo flag, the XMP PDF/UA identifier and page tab order.

use std::sync::OnceLock;

use lopdf::{dictionary, Object, ObjectId, Stream};
use regex::Regex;

use crate::error::Result;
use crate::instruction::{InstructionSet, MetadataInstruction, TabOrder};
use crate::interpret::tree::set_mark_info;
use crate::interpret::Handler;
use crate::pdf::objects::reference;
use crate::pdf::text::text_string;
use crate::pdf::DocumentHandle;

const PDFUA_NAMESPACE: &str = "http://www.aiim.org/pdfua/ns/id/";

pub struct MetadataHandler;

impl Handler for MetadataHandler {
    type Section = MetadataInstruction;

    fn name(&self) -> &'static str {
        "metadata"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a MetadataInstruction> {
        set.metadata.as_ref()
    }

    fn apply(
        &self,
        mut handle: DocumentHandle,
        metadata: &MetadataInstruction,
    ) -> Result<DocumentHandle> {
        if let Some(language) = &metadata.language {
            log::debug!("Setting document language to {}", language);
            handle.catalog_mut()?.set("Lang", text_string(language));
        }
        if let Some(title) = &metadata.title {
            handle.info_mut()?.set("Title", text_string(title));
        }
        if let Some(display) = metadata.display_doc_title {
            let catalog = handle.catalog_id()?;
            let preferences = handle.ensure_indirect_dict(catalog, b"ViewerPreferences")?;
            handle
                .document_mut()
                .get_dictionary_mut(preferences)?
                .set("DisplayDocTitle", Object::Boolean(display));
        }
        if let Some(marked) = metadata.mark_info {
            set_mark_info(&mut handle, marked)?;
        }
        if let Some(part) = metadata.pdfua_identifier {
            write_pdfua_part(&mut handle, part, metadata.title.as_deref())?;
        }
        if let Some(order) = metadata.tab_order.as_deref().and_then(TabOrder::parse) {
            set_tab_order(&mut handle, order)?;
        }
        Ok(handle)
    }
}

fn set_tab_order(handle: &mut DocumentHandle, order: TabOrder) -> Result<()> {
    let pages: Vec<ObjectId> = handle.document().get_pages().into_values().collect();
    log::debug!("Setting /Tabs /{} on {} page(s)", order.pdf_name(), pages.len());
    for page_id in pages {
        handle
            .document_mut()
            .get_dictionary_mut(page_id)?
            .set("Tabs", Object::Name(order.pdf_name().as_bytes().to_vec()));
    }
    Ok(())
}

/// Write `pdfuaid:part` into the catalog's XMP packet, creating the packet
/// when the document has none.
fn write_pdfua_part(handle: &mut DocumentHandle, part: i64, title: Option<&str>) -> Result<()> {
    let existing = existing_xmp(handle);
    let packet = match existing {
        Some(xmp) => patch_pdfua_part(&xmp, part),
        None => new_packet(part, title),
    };
    let mut stream = Stream::new(
        dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
        packet.into_bytes(),
    );
    // Metadata streams stay uncompressed.
    stream.allows_compression = false;
    let stream_id = handle.document_mut().add_object(stream);
    handle
        .catalog_mut()?
        .set("Metadata", Object::Reference(stream_id));
    Ok(())
}

fn existing_xmp(handle: &DocumentHandle) -> Option<String> {
    let catalog = handle.catalog().ok()?;
    let id = catalog.get(b"Metadata").ok().and_then(reference)?;
    let stream = handle.document().get_object(id).ok()?.as_stream().ok()?;
    let bytes = if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()?
    } else {
        stream.content.clone()
    };
    Some(String::from_utf8_lossy(&bytes).to_string())
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"pdfuaid:part\s*=\s*(["'])[^"']*(["'])"#).expect("attribute pattern compiles")
    })
}

fn element_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<pdfuaid:part>[^<]*</pdfuaid:part>").expect("element pattern compiles")
    })
}

/// Replace or insert the identifier in an existing packet.
fn patch_pdfua_part(xmp: &str, part: i64) -> String {
    if attribute_pattern().is_match(xmp) {
        return attribute_pattern()
            .replace(xmp, format!("pdfuaid:part=\"{}\"", part).as_str())
            .to_string();
    }
    if element_pattern().is_match(xmp) {
        return element_pattern()
            .replace(xmp, format!("<pdfuaid:part>{}</pdfuaid:part>", part).as_str())
            .to_string();
    }
    let description = format!(
        "<rdf:Description rdf:about=\"\" xmlns:pdfuaid=\"{}\">\
         <pdfuaid:part>{}</pdfuaid:part></rdf:Description>",
        PDFUA_NAMESPACE, part
    );
    match xmp.rfind("</rdf:RDF>") {
        Some(at) => {
            let mut patched = String::with_capacity(xmp.len() + description.len());
            patched.push_str(&xmp[..at]);
            patched.push_str(&description);
            patched.push_str(&xmp[at..]);
            patched
        }
        None => {
            log::warn!("XMP packet has no rdf:RDF element; replacing it");
            new_packet(part, None)
        }
    }
}

fn new_packet(part: i64, title: Option<&str>) -> String {
    let title = title
        .map(|t| {
            format!(
                "<rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
                 <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:title>\
                 </rdf:Description>\n",
                escape_xml(t)
            )
        })
        .unwrap_or_default();
    format!(
        "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n\
         <x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n\
         <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n\
         <rdf:Description rdf:about=\"\" xmlns:pdfuaid=\"{}\">\
         <pdfuaid:part>{}</pdfuaid:part></rdf:Description>\n\
         {}</rdf:RDF>\n\
         </x:xmpmeta>\n\
         <?xpacket end=\"w\"?>",
        PDFUA_NAMESPACE, part, title
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
