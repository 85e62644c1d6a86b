use chip8::prelude::*;

#[test]
#[rustfmt::skip]
fn test_disassembler_listing() {
    const ROM: &[u8] = &[
        0xA2, 0x08, // LD I, 0x208
        0xD0, 0x15, // DRW v0, v1, 5
        0x12, 0x04, // JP 0x204
        0x00, 0xFB, // SCHIP scroll
        0xF0,       // odd trailing byte
    ];

    let listing = Disassembler::new(ROM).to_listing().unwrap();
    let lines: Vec<&str> = listing.lines().collect();

    assert_eq!(lines, [
        "0x0200 A208 LD I, 0x208",
        "0x0202 D015 DRW v0, v1, 5",
        "0x0204 1204 JP 0x204",
        "0x0206 00FB ??",
        "0x0208 F0",
    ]);
}
