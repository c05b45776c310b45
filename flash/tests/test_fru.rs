use anvil_flash::fru::{
    compare_fields, generate_fru_image, parse_fru_print, FruFields, FruIdentity, FRU_BLANK_SIZE,
};

fn sample_identity() -> FruIdentity {
    FruIdentity {
        manufacturer: "ACME".to_string(),
        product: "Widget X1".to_string(),
        serial: "SN012345".to_string(),
    }
}

fn zero_sum(area: &[u8]) -> bool {
    area.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

/// Walks the board area's type/length-encoded fields back out of a
/// generated image.
fn decode_board_fields(image: &[u8]) -> Vec<String> {
    let board = &image[8..];
    let mut fields = Vec::new();
    let mut offset = 6; // version, length, language, 3-byte date
    while board[offset] != 0xC1 {
        let len = (board[offset] & 0x3F) as usize;
        fields.push(String::from_utf8_lossy(&board[offset + 1..offset + 1 + len]).to_string());
        offset += 1 + len;
    }
    fields
}

#[test]
fn test_generated_image_fills_the_chip() {
    let image = generate_fru_image(&sample_identity()).unwrap();
    assert_eq!(image.len(), FRU_BLANK_SIZE);
}

#[test]
fn test_common_header_and_board_area_checksums() {
    let image = generate_fru_image(&sample_identity()).unwrap();
    assert_eq!(image[0], 0x01); // header format version
    assert_eq!(image[3], 0x01); // board area at one 8-byte unit
    assert!(zero_sum(&image[..8]));

    let board_len = image[9] as usize * 8;
    assert_eq!(board_len % 8, 0);
    assert!(zero_sum(&image[8..8 + board_len]));
}

#[test]
fn test_identity_fields_round_trip_through_the_image() {
    let id = sample_identity();
    let image = generate_fru_image(&id).unwrap();
    let fields = decode_board_fields(&image);
    assert_eq!(fields, vec![id.manufacturer, id.product, id.serial]);
}

#[test]
fn test_oversized_field_is_rejected() {
    let mut id = sample_identity();
    id.serial = "9".repeat(64);
    assert!(generate_fru_image(&id).is_err());
}

#[test]
fn test_parse_fru_print_extracts_board_fields() {
    let output = "\
FRU Device Description : Builtin FRU Device (ID 0)
 Board Mfg Date        : Mon Jan  1 00:00:00 1996
 Board Mfg             : ACME
 Board Product         : Widget X1
 Board Serial          : SN012345
 Board Part Number     :
";
    let fields = parse_fru_print(output);
    assert_eq!(fields.manufacturer.as_deref(), Some("ACME"));
    assert_eq!(fields.product.as_deref(), Some("Widget X1"));
    assert_eq!(fields.serial.as_deref(), Some("SN012345"));
}

#[test]
fn test_parse_fru_print_treats_blank_values_as_missing() {
    let fields = parse_fru_print(" Board Serial          :\n");
    assert!(fields.serial.is_none());
}

#[test]
fn test_compare_fields_names_each_mismatch() {
    let id = sample_identity();
    let read = FruFields {
        manufacturer: Some("ACME".to_string()),
        product: Some("Widget X2".to_string()),
        serial: None,
    };
    let mismatches = compare_fields(&id, &read);
    assert_eq!(mismatches.len(), 2);
    assert!(mismatches[0].starts_with("product:"));
    assert!(mismatches[0].contains("wrote 'Widget X1'"));
    assert!(mismatches[0].contains("read 'Widget X2'"));
    assert!(mismatches[1].starts_with("serial:"));
}

#[test]
fn test_compare_fields_accepts_an_exact_match() {
    let id = sample_identity();
    let read = FruFields {
        manufacturer: Some(id.manufacturer.clone()),
        product: Some(id.product.clone()),
        serial: Some(id.serial.clone()),
    };
    assert!(compare_fields(&id, &read).is_empty());
}
