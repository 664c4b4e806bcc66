//! Claim export fixtures

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// EMS export with three labeled totals
pub const EMS_WITH_TOTALS: &str = "HDR|EMS|2.6\r\n\
CLM|A|CLM7001\r\n\
VEH|2017|TOYOTA|2T1BURHE0JC043821\r\n\
TOT|PARTS|100.00\r\n\
TOT|LABOR|250.00\r\n\
TOT|GRAND|999.99\r\n";

/// XML cut off mid-element
pub const TRUNCATED_XML: &str = "<?xml version=\"1.0\"?>\n<Claim><ClaimNumber>CLM9002</ClaimNumber><Vehicle><VIN>1HGCM8";

/// Minimal well-formed claim XML
pub fn claim_xml(claim_number: &str, vin: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Claim>
  <ClaimNumber>{}</ClaimNumber>
  <Vehicle><VIN>{}</VIN></Vehicle>
  <Customer><Name>Dana Ortiz</Name></Customer>
  <TotalAmount>$2,418.50</TotalAmount>
</Claim>
"#,
        claim_number, vin
    )
}

/// Zip container with the given entries (stored, not compressed)
pub fn build_awf(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Write a file into the inbox
pub fn drop_file(inbox: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = inbox.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
