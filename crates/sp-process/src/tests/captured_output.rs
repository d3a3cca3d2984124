use crate::captured_output::{MAX_CAPTURED_BYTES, decode_line, push_bounded};

use googletest::assert_that;
use googletest::prelude::eq;

#[test]
fn given_small_output_when_pushed_then_lines_kept_in_order() {
    let mut buffer = String::new();

    push_bounded(&mut buffer, "first");
    push_bounded(&mut buffer, "second");

    assert_that!(buffer, eq("first\nsecond\n"));
}

#[test]
fn given_output_over_limit_when_pushed_then_only_tail_kept() {
    let mut buffer = String::new();
    let line = "x".repeat(1000);

    for _ in 0..100 {
        push_bounded(&mut buffer, &line);
    }
    push_bounded(&mut buffer, "last");

    assert_that!(buffer.len() <= MAX_CAPTURED_BYTES, eq(true));
    assert_that!(buffer.ends_with("last\n"), eq(true));
}

#[test]
fn given_multibyte_output_over_limit_when_pushed_then_still_valid_utf8() {
    let mut buffer = String::new();
    let line = "é".repeat(MAX_CAPTURED_BYTES / 2 + 1);

    push_bounded(&mut buffer, &line);

    assert_that!(buffer.len() <= MAX_CAPTURED_BYTES, eq(true));
    assert_that!(buffer.ends_with("é\n"), eq(true));
}

#[test]
fn given_invalid_utf8_line_when_decoded_then_replaced_and_terminator_stripped() {
    let line = decode_line(b"caf\xe9\r\n");

    assert_that!(line.as_ref(), eq("caf\u{FFFD}"));
}

#[test]
fn given_line_without_newline_when_decoded_then_kept_whole() {
    let line = decode_line(b"last words");

    assert_that!(line.as_ref(), eq("last words"));
}
