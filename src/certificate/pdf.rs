use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};

/// Points per CSS pixel (72 / 96).
const PT_PER_PX: f32 = 0.75;

/// JPEG-encoded page raster.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Builds a PDF with one page per image, in the order given.
pub fn assemble(title: &str, pages: &[PageImage]) -> Vec<u8> {
    let mut pdf = Pdf::new();
    let catalog_id = Ref::new(1);
    let tree_id = Ref::new(2);
    let info_id = Ref::new(3);
    let image_name = Name(b"Im1");

    // Three objects per page: page, image, content stream
    let page_ids: Vec<Ref> = (0..pages.len())
        .map(|i| Ref::new(4 + 3 * i as i32))
        .collect();

    pdf.catalog(catalog_id).pages(tree_id);
    pdf.pages(tree_id)
        .kids(page_ids.iter().copied())
        .count(pages.len() as i32);
    pdf.document_info(info_id).title(TextStr(title));

    for (page_id, page) in page_ids.iter().zip(pages) {
        let image_id = Ref::new(page_id.get() + 1);
        let content_id = Ref::new(page_id.get() + 2);
        let width = page.width as f32 * PT_PER_PX;
        let height = page.height as f32 * PT_PER_PX;

        let mut page_writer = pdf.page(*page_id);
        page_writer.media_box(Rect::new(0.0, 0.0, width, height));
        page_writer.parent(tree_id);
        page_writer.contents(content_id);
        page_writer.resources().x_objects().pair(image_name, image_id);
        page_writer.finish();

        let mut image = pdf.image_xobject(image_id, &page.jpeg);
        image.filter(Filter::DctDecode);
        image.width(page.width as i32);
        image.height(page.height as i32);
        image.color_space().device_rgb();
        image.bits_per_component(8);
        image.finish();

        let mut content = Content::new();
        content.save_state();
        content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
        content.x_object(image_name);
        content.restore_state();
        pdf.stream(content_id, &content.finish());
    }

    pdf.finish()
}
