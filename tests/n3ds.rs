mod common;

use common::{smdh, CountingSource};
use romprops::fields::FieldValue;
use romprops::image::{ImageSize, ImageType};
use romprops::metadata::{MetaValue, Property};
use romprops::n3ds::raw::{self, tmd, CiaHeader, ContentChunk, TmdHeader};
use romprops::raw::{encode, ByteOrder, Bytes};
use romprops::rom::{self, FileType, SystemName};
use romprops::{Error, Options};

fn pad64(out: &mut Vec<u8>) {
    let len = (out.len() + 63) & !63;
    out.resize(len, 0);
}

fn tmd(content_size: u64, encrypted: bool) -> Vec<u8> {
    // RSA-2048 signature block
    let mut out = 0x0001_0004u32.to_be_bytes().to_vec();
    out.resize(0x140, 0);
    let header = TmdHeader {
        issuer: Bytes::default(),
        version: 1,
        ca_crl_version: 0,
        signer_crl_version: 0,
        reserved0: 0,
        system_version: 0,
        title_id: 0x0004_0000_00AB_CD00,
        title_type: 0x40,
        group_id: 0,
        save_data_size: 0,
        srl_private_save_size: 0,
        reserved1: 0,
        srl_flag: 0,
        reserved2: Bytes::default(),
        access_rights: 0,
        title_version: 2 << 10,
        content_count: 1,
        boot_content: 0,
        padding: 0,
        info_records_hash: Bytes::default(),
    };
    out.extend(encode(&header, ByteOrder::Big).unwrap());
    out.resize(out.len() + tmd::INFO_RECORDS_SIZE as usize, 0);
    let chunk = ContentChunk {
        id: 7,
        index: 0,
        kind: if encrypted { tmd::CONTENT_ENCRYPTED } else { 0 },
        size: content_size,
        hash: Bytes::default(),
    };
    out.extend(encode(&chunk, ByteOrder::Big).unwrap());
    out
}

/// A CIA with one content of `content_len` zero bytes and a meta SMDH.
fn cia(content_len: usize, encrypted: bool) -> Vec<u8> {
    let tmd = tmd(content_len as u64, encrypted);
    let meta = smdh("Packaged", "Indie", 0x001F);
    let header = CiaHeader {
        header_size: raw::CIA_HEADER_SIZE,
        kind: 0,
        version: 0,
        cert_chain_size: 0x20,
        ticket_size: 0x20,
        tmd_size: tmd.len() as u32,
        meta_size: (raw::CIA_META_SMDH as usize + meta.len()) as u32,
        content_size: content_len as u64,
    };
    let mut out = encode(&header, ByteOrder::Little).unwrap();
    out.resize(raw::CIA_HEADER_SIZE as usize, 0);
    out[0x20] = 0x80;
    pad64(&mut out);
    out.extend_from_slice(&[0xAA; 0x20]);
    pad64(&mut out);
    out.extend_from_slice(&[0xBB; 0x20]);
    pad64(&mut out);
    out.extend(tmd);
    pad64(&mut out);
    out.resize(out.len() + content_len, 0);
    pad64(&mut out);
    out.resize(out.len() + raw::CIA_META_SMDH as usize, 0);
    out.extend(meta);
    out
}

#[test]
fn smdh_icon_file() {
    let source = CountingSource::new(smdh("Standalone", "Homebrew Team", 0xF800));
    let mut reader = rom::open(source.clone(), None, &Options::default()).unwrap();
    assert_eq!(reader.file_type(), FileType::IconFile);
    assert_eq!(reader.system_name(SystemName::Long), Some("Nintendo 3DS"));

    let fields = reader.fields().unwrap();
    assert_eq!(fields.get_str("Title"), Some("Standalone"));
    assert_eq!(fields.get_str("Publisher"), Some("Homebrew Team"));
    let metadata = reader.metadata().unwrap();
    assert_eq!(
        metadata.get(Property::Publisher),
        Some(&MetaValue::String("Homebrew Team".to_string()))
    );

    assert_eq!(
        reader.image_sizes(ImageType::IntIcon),
        vec![ImageSize::new(24, 24), ImageSize::new(48, 48)]
    );
    let icon = reader.image(ImageType::IntIcon).unwrap();
    assert_eq!((icon.width(), icon.height()), (48, 48));
    assert_eq!(icon.pixel(0, 0), Some(0xFFFF_0000));

    let reads = source.reads();
    reader.image(ImageType::IntIcon).unwrap();
    reader.fields().unwrap();
    assert_eq!(source.reads(), reads);

    assert!(reader.image(ImageType::IntBanner).unwrap_err().is_not_found());
    assert!(reader.image_sizes(ImageType::IntBanner).is_empty());
}

#[test]
fn encrypted_cia_content_is_reported_not_fatal() {
    let data = cia(0x400, true);
    let mut reader = rom::open(CountingSource::new(data), Some(".cia"), &Options::default()).unwrap();
    assert_eq!(reader.file_type(), FileType::ApplicationPackage);

    let fields = reader.fields().unwrap();
    assert_eq!(fields.get_str("Title"), Some("Packaged"));
    assert_eq!(fields.get_str("Title ID"), Some("0x0004000000ABCD00"));
    assert_eq!(fields.get_str("NCCH"), Some("Encrypted (key unavailable)"));
    match &fields.get("Contents").unwrap().value {
        FieldValue::ListData { rows, .. } => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0][1], "00000007");
            assert_eq!(rows[0][2], "Encrypted");
        }
        other => panic!("unexpected value {:?}", other),
    }

    // the meta SMDH still provides the icon
    let icon = reader.image(ImageType::IntIcon).unwrap();
    assert_eq!(icon.pixel(10, 10), Some(0xFF00_00FF));
}

#[test]
fn cia_needs_extension_and_consistent_sizes() {
    let good = cia(0x400, false);
    assert!(rom::open(CountingSource::new(good.clone()), Some(".cia"), &Options::default()).is_ok());

    let err = rom::open(CountingSource::new(good.clone()), None, &Options::default()).unwrap_err();
    assert_eq!(err.code(), Error::Unsupported.code());

    // declared content size far past the end of the file
    let mut oversized = good;
    oversized[0x18..0x20].copy_from_slice(&0x0100_0000u64.to_le_bytes());
    let err = rom::open(CountingSource::new(oversized), Some(".cia"), &Options::default()).unwrap_err();
    assert_eq!(err.code(), Error::Unsupported.code());
}

#[test]
fn truncated_containers_are_unsupported() {
    let full = smdh("Cut", "Off", 0);
    for &len in &[0usize, 4, 0x1FF, 0x200, 0x36BF] {
        let err = rom::open(CountingSource::new(full[..len].to_vec()), None, &Options::default())
            .unwrap_err();
        assert_eq!(err.code(), Error::Unsupported.code(), "len {:#X}", len);
    }
}
