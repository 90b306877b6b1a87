//! Binarizer bijectivity and incremental predicate consistency over a broad
//! sweep of `(cutoff, order)`.

use crate::binarizer::Binarizer;

fn sample_values() -> Vec<i32> {
    let mut values: Vec<i32> = (-300..=300).collect();
    for shift in 9..31 {
        let v = 1i32 << shift;
        values.extend([v - 1, v, v + 1, -v, -(v - 1)]);
    }
    values.extend([i32::MAX, i32::MIN, i32::MIN + 1]);
    values
}

#[test]
fn test_decode_inverts_code_for_all_configurations() {
    let values = sample_values();
    for cutoff in 1..=20 {
        for order in 0..=6 {
            let b = Binarizer::new(cutoff, order).unwrap();
            for &v in &values {
                let code = b.code(v);
                assert_eq!(
                    b.decode(&code).unwrap(),
                    v,
                    "cutoff={} order={} value={}",
                    cutoff,
                    order,
                    v
                );
            }
        }
    }
}

#[test]
fn test_is_code_true_only_on_last_bit() {
    let values = sample_values();
    for cutoff in [1, 2, 3, 5, 9, 14, 19] {
        for order in [0, 1, 3, 6] {
            let b = Binarizer::new(cutoff, order).unwrap();
            for &v in &values {
                let code = b.code(v);
                for len in 0..=code.len() {
                    assert_eq!(
                        b.is_code(&code[..len]),
                        len == code.len(),
                        "cutoff={} order={} value={} prefix={}",
                        cutoff,
                        order,
                        v,
                        len
                    );
                }
            }
        }
    }
}

#[test]
fn test_is_sign_true_only_before_sign_bit() {
    let values = sample_values();
    for cutoff in [1, 2, 4, 9, 17] {
        for order in [0, 2, 3, 5] {
            let b = Binarizer::new(cutoff, order).unwrap();
            for &v in &values {
                let code = b.code(v);
                for len in 0..=code.len() {
                    let expected = v != 0 && len + 1 == code.len();
                    assert_eq!(
                        b.is_sign(&code[..len]),
                        expected,
                        "cutoff={} order={} value={} prefix={}",
                        cutoff,
                        order,
                        v,
                        len
                    );
                }
            }
        }
    }
}

#[test]
fn test_sign_bit_is_last() {
    let b = Binarizer::new(9, 3).unwrap();
    for v in [1, 8, 9, 10, 1000, -1, -8, -9, -10, -1000] {
        let code = b.code(v);
        assert_eq!(*code.last().unwrap(), v < 0);
        assert_eq!(b.code(-v)[..code.len() - 1], code[..code.len() - 1]);
    }
}

#[test]
fn test_code_length_grows_logarithmically_past_cutoff() {
    let b = Binarizer::new(9, 3).unwrap();
    let short = b.code(100).len();
    let long = b.code(100_000).len();
    assert!(long > short);
    // unary would need ~100k bits
    assert!(long < 50, "code for 100000 has {} bits", long);
}
