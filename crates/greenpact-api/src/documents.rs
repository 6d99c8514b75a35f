//! Contract agreement documents.
//!
//! The renderer sits behind [`ContractRenderer`] so approval can be tested
//! with a failing or recording fake. [`PdfContractRenderer`] writes a plain
//! multi-page PDF using the two built-in Helvetica faces, which every
//! viewer ships, so no font embedding is needed.

use anyhow::Result;

use greenpact_db::models::{ContractRow, ProfileRow};

/// Contact block for one side of the agreement.
#[derive(Debug, Clone, Default)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub phone: String,
}

impl Party {
    /// Falls back to the bare username when the profile is gone.
    pub fn from_profile(profile: Option<&ProfileRow>, username: &str) -> Self {
        match profile {
            Some(p) => Self {
                name: p.name.clone(),
                address: p.address.clone(),
                phone: p.phone.clone(),
            },
            None => Self {
                name: username.to_string(),
                ..Default::default()
            },
        }
    }
}

pub struct ContractSheet<'a> {
    pub contract: &'a ContractRow,
    pub farmer: Party,
    pub buyer: Party,
}

pub trait ContractRenderer: Send + Sync {
    fn render(&self, sheet: &ContractSheet<'_>) -> Result<Vec<u8>>;
}

pub struct PdfContractRenderer;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN_LEFT: u32 = 50;
const TOP: i32 = PAGE_HEIGHT as i32 - 50;
const BOTTOM: i32 = 60;

struct Line {
    text: String,
    size: i32,
    gap: i32,
    bold: bool,
}

#[derive(Default)]
struct Layout {
    lines: Vec<Line>,
}

impl Layout {
    fn text(&mut self, text: impl Into<String>) {
        self.lines.push(Line { text: text.into(), size: 11, gap: 14, bold: false });
    }

    fn label(&mut self, text: &str) {
        self.lines.push(Line { text: text.into(), size: 11, gap: 14, bold: true });
    }

    fn heading(&mut self, text: &str) {
        self.lines.push(Line { text: text.into(), size: 11, gap: 18, bold: true });
    }

    fn space(&mut self, gap: i32) {
        self.lines.push(Line { text: String::new(), size: 11, gap, bold: false });
    }

    /// Splits lines into page content streams.
    fn paginate(&self) -> Vec<String> {
        let mut pages = Vec::new();
        let mut stream = String::new();
        let mut y = TOP;

        for line in &self.lines {
            if y < BOTTOM {
                pages.push(std::mem::take(&mut stream));
                y = TOP;
            }
            if !line.text.is_empty() {
                let font = if line.bold { "F2" } else { "F1" };
                stream.push_str(&format!(
                    "BT /{} {} Tf {} {} Td ({}) Tj ET\n",
                    font,
                    line.size,
                    MARGIN_LEFT,
                    y,
                    escape(&line.text)
                ));
            }
            y -= line.gap;
        }
        pages.push(stream);
        pages
    }
}

impl ContractRenderer for PdfContractRenderer {
    fn render(&self, sheet: &ContractSheet<'_>) -> Result<Vec<u8>> {
        let c = sheet.contract;
        let total = c.total_price();
        let mut doc = Layout::default();

        doc.lines.push(Line {
            text: "Greenpact Crop Supply Agreement".into(),
            size: 16,
            gap: 20,
            bold: true,
        });
        doc.text(format!("Contract ID: {}", c.id));
        doc.text(format!("Date of Agreement: {}", c.created_at.date_naive()));
        doc.space(10);

        doc.heading("1. Parties Involved");
        for (title, party) in [("Farmer Details:", &sheet.farmer), ("Buyer / Contractor Details:", &sheet.buyer)] {
            doc.label(title);
            doc.text(format!("  Name   : {}", party.name));
            doc.text(format!("  Address: {}", party.address));
            doc.text(format!("  Phone  : {}", party.phone));
            doc.space(6);
        }
        doc.space(4);

        doc.heading("2. Crop & Order Details");
        doc.text(format!("Crop Name      : {}", c.crop_name));
        doc.text(format!("Quantity       : {}", c.quantity));
        doc.text(format!("Price per Unit : {}", c.nego_price));
        doc.text(format!("Total Amount   : {}", total));
        doc.text(format!("Delivery Date  : {}", c.delivery_date));
        doc.text(format!("Delivery Address: {}", c.delivery_address));
        doc.space(10);

        doc.heading("3. Agreement Terms");
        if c.terms.is_empty() {
            doc.text("No additional terms specified.");
        }
        for (i, term) in c.terms.iter().enumerate() {
            doc.text(format!("{}. {}", i + 1, term));
        }
        doc.space(10);

        doc.heading("4. Payment Terms");
        doc.text(format!("Total payable amount is {}.", total));
        doc.text("Payment shall be completed as per the mutually agreed schedule.");
        doc.text("Any delay in payment may attract penalties as per mutual agreement.");
        doc.space(10);

        doc.heading("5. Responsibilities of Both Parties");
        doc.label("Farmer Responsibilities:");
        doc.text("- Deliver the agreed crop in specified quantity and quality.");
        doc.text("- Inform buyer in case of any expected delay or issue.");
        doc.space(6);
        doc.label("Buyer Responsibilities:");
        doc.text("- Pay the agreed amount as per the payment terms.");
        doc.text("- Accept delivery at the agreed time and place.");
        doc.space(10);

        doc.heading("6. Liability & Dispute Resolution");
        doc.text("In case of disputes, both parties agree to resolve the matter amicably.");
        doc.text("If unresolved, the issue will be handled under the jurisdiction of the");
        doc.text("local district court where the farmer resides.");
        doc.space(10);

        doc.heading("7. Termination Clause");
        doc.text("Either party may terminate the contract with prior written notice,");
        doc.text("subject to settlement of any outstanding obligations.");
        doc.text("The contract automatically terminates after full delivery and payment.");
        doc.space(30);

        doc.label("Signatures");
        doc.text(format!("Farmer: {}", sheet.farmer.name));
        doc.text(format!("Buyer : {}", sheet.buyer.name));

        Ok(assemble(&doc.paginate()))
    }
}

/// PDF string literal body. Non-ASCII becomes `?` since the standard
/// fonts only cover WinAnsi and offsets must stay byte-exact.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            _ => out.push('?'),
        }
    }
    out
}

/// Object 1 is the catalog, 2 the page tree, 3 and 4 the fonts; page `i`
/// is object `5 + 2i` followed by its content stream.
fn assemble(pages: &[String]) -> Vec<u8> {
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 5 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    for (i, content) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH,
            PAGE_HEIGHT,
            6 + 2 * i
        ));
        objects.push(format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
    }

    let xref = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn contract(terms: Vec<String>) -> ContractRow {
        ContractRow {
            id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            farmer_username: "ravi".into(),
            farmer_name: "Ravi Kumar".into(),
            farmer_qr: None,
            buyer_id: Uuid::new_v4(),
            buyer_username: "kiran".into(),
            buyer_name: "Kiran (Agro) Ltd".into(),
            crop_id: Uuid::new_v4(),
            crop_name: "Wheat".into(),
            nego_price: 2200,
            quantity: 10,
            delivery_address: "Mandi gate 4".into(),
            delivery_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            terms,
            status: true,
            document: None,
            created_at: Utc::now(),
        }
    }

    fn render(c: &ContractRow) -> String {
        let sheet = ContractSheet {
            contract: c,
            farmer: Party::from_profile(None, &c.farmer_username),
            buyer: Party { name: c.buyer_name.clone(), address: "Pune".into(), phone: "9800000000".into() },
        };
        String::from_utf8(PdfContractRenderer.render(&sheet).unwrap()).unwrap()
    }

    #[test]
    fn document_carries_the_deal() {
        let pdf = render(&contract(vec!["Grade A only".into()]));
        assert!(pdf.starts_with("%PDF-1.4\n"));
        assert!(pdf.ends_with("%%EOF\n"));
        assert!(pdf.contains("(Crop Name      : Wheat)"));
        assert!(pdf.contains("(Total Amount   : 22000)"));
        assert!(pdf.contains("(1. Grade A only)"));
        assert!(pdf.contains("(  Name   : Kiran \\(Agro\\) Ltd)"));
        assert!(pdf.contains("(  Name   : ravi)"));
        assert!(pdf.contains("/Count 1"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = render(&contract(Vec::new()));
        let start: usize = pdf.rsplit("startxref\n").next().unwrap().lines().next().unwrap().parse().unwrap();
        assert!(pdf[start..].starts_with("xref\n"));

        let entries: Vec<usize> = pdf[start..]
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        for (i, offset) in entries.iter().enumerate() {
            assert!(pdf[*offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn long_term_lists_spill_onto_more_pages() {
        let terms = (0..80).map(|i| format!("Clause number {}", i)).collect();
        let pdf = render(&contract(terms));
        assert!(pdf.contains("/Count 3") || pdf.contains("/Count 2"));
        assert!(pdf.contains("(80. Clause number 79)"));
    }

    #[test]
    fn non_ascii_is_replaced() {
        assert_eq!(escape("Gehu\u{0901} (a\\b)"), "Gehu? \\(a\\\\b\\)");
    }
}
