use super::*;

#[test]
fn rows_pad_to_the_copy_alignment() {
    assert_eq!(align_to(4, 256), 256);
    assert_eq!(align_to(256, 256), 256);
    assert_eq!(align_to(257, 256), 512);
}
