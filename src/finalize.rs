use lopdf::{Document, Object, dictionary};
use log::debug;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::Builder;

use crate::error::{Error, Result};

/// Document metadata stamped on the output.
#[derive(Debug, Clone)]
pub struct DocInfo {
    pub title: String,
    /// PDF date string, e.g. `D:20260101120000`.
    pub created: String,
}

/// Stamp the info dictionary on raw PDF bytes and compress every stream.
pub fn post_process(bytes: &[u8], info: &DocInfo) -> Result<Document> {
    let mut doc = Document::load_mem(bytes)?;
    let producer = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(info.title.as_str()),
        "Creator" => Object::string_literal(env!("CARGO_PKG_NAME")),
        "Producer" => Object::string_literal(producer),
        "CreationDate" => Object::string_literal(info.created.as_str()),
    });
    doc.trailer.set("Info", info_id);
    doc.compress();
    debug!("post-processed {} page(s)", doc.get_pages().len());
    Ok(doc)
}

/// Save next to `out` under a temporary name, then rename into place, so a
/// failed run never leaves a truncated file at `out`. The result gets the
/// usual `0644` less umask rather than the private mode of a temp file.
pub fn save_atomic(doc: &mut Document, out: &Path) -> Result<()> {
    let write_err = |source| Error::OutputWrite { path: out.to_path_buf(), source };

    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut builder = Builder::new();
    builder.prefix(".card_sheet");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let mut tmp = builder.tempfile_in(dir).map_err(write_err)?;
    {
        let mut w = BufWriter::new(&mut tmp);
        doc.save_to(&mut w).map_err(write_err)?;
        w.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(out).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_writer::{Pdf, Rect, Ref};

    fn blank_pdf(pages: i32) -> Vec<u8> {
        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let tree_id = alloc.bump();
        let ids: Vec<Ref> = (0..pages).map(|_| alloc.bump()).collect();
        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id).kids(ids.iter().copied()).count(pages);
        for id in ids {
            pdf.page(id).parent(tree_id).media_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        }
        pdf.finish()
    }

    fn info() -> DocInfo {
        DocInfo { title: "deck".into(), created: "D:20260101000000".into() }
    }

    #[test]
    fn stamps_document_info() {
        let doc = post_process(&blank_pdf(2), &info()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        let info_ref = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let dict = doc.get_object(info_ref).unwrap().as_dict().unwrap();
        assert_eq!(dict.get(b"Title").unwrap().as_str().unwrap(), b"deck");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(post_process(b"not a pdf", &info()), Err(Error::Pdf(_))));
    }

    #[test]
    fn saves_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output").join("deck.pdf");
        let mut doc = post_process(&blank_pdf(1), &info()).unwrap();
        save_atomic(&mut doc, &out).unwrap();
        assert_eq!(Document::load(&out).unwrap().get_pages().len(), 1);
        // only the final file remains
        assert_eq!(fs::read_dir(out.parent().unwrap()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_not_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deck.pdf");
        let mut doc = post_process(&blank_pdf(1), &info()).unwrap();
        save_atomic(&mut doc, &out).unwrap();

        // a plain file reveals the umask: 0666 & !umask
        let plain = dir.path().join("plain");
        fs::write(&plain, b"").unwrap();
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&out), 0o644 & mode(&plain));
    }

    #[test]
    fn unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let mut doc = post_process(&blank_pdf(1), &info()).unwrap();
        let err = save_atomic(&mut doc, &blocker.join("deck.pdf")).unwrap_err();
        assert!(matches!(err, Error::OutputWrite { .. }));
    }
}
