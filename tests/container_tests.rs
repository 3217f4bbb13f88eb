use std::sync::Arc;

use ragbox::container::{Container, MemoryOrder, TypeHints};
use ragbox::device::{DeviceSpec, MANAGED};
use ragbox::error::Error;
use ragbox::value::Value;

#[test]
fn test_fixed_array_inference() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    assert_eq!(c.ty().to_string(), "2 * 3 * int64");
    assert_eq!(c.shape().unwrap(), vec![2, 3]);
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_ragged_array_inference() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4]]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    assert_eq!(c.ty().to_string(), "var * var * int64");
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_record_inference() {
    let v = Value::record([("a", Value::from("xyz")), ("b", Value::from(vec![1, 2, 3]))]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    assert_eq!(c.ty().to_string(), "{a : string, b : 3 * int64}");
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_categorical_levels() {
    let v = Value::List(vec![
        Value::from("a"),
        Value::from("b"),
        Value::None,
        Value::from("a"),
    ]);
    let hints = TypeHints::with_levels([Some("a"), Some("b"), None]);
    let c = Container::new(&v, hints, None).unwrap();
    assert_eq!(c.ty().to_string(), "4 * categorical('a', 'b', NA)");
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_explicit_type_hint() {
    let v = Value::from(vec![1, 1, 1, 1]);
    let c = Container::new(&v, TypeHints::with_type("4 * uint8"), None).unwrap();
    assert_eq!(c.ty().to_string(), "4 * uint8");
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_dtype_hint_constrains_inference() {
    let v = Value::from(vec![vec![1, 2], vec![3, 4]]);
    let c = Container::new(&v, TypeHints::with_dtype("float32"), None).unwrap();
    assert_eq!(c.ty().to_string(), "2 * 2 * float32");
}

#[test]
fn test_typedef_instantiates_abstract_template() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    let c = Container::new(&v, TypeHints::with_typedef("N * M * Any"), None).unwrap();
    assert_eq!(c.ty().to_string(), "2 * 3 * int64");
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_dtypedef_hint() {
    let v = Value::from(vec![1, 2, 3]);
    let c = Container::new(&v, TypeHints::with_dtypedef("int32"), None).unwrap();
    assert_eq!(c.ty().to_string(), "3 * int32");
}

#[test]
fn test_conflicting_hints_fail() {
    let v = Value::from(vec![1, 2, 3]);
    let hints = TypeHints {
        dtype: Some("int64".into()),
        levels: Some(vec![Some("a".to_string())]),
        ..TypeHints::default()
    };
    match Container::new(&v, hints, None) {
        Err(Error::ConflictingHints { given }) => {
            assert_eq!(given, vec!["dtype", "levels"]);
        }
        other => panic!("expected ConflictingHints, got {other:?}"),
    }

    let hints = TypeHints {
        ty: Some("3 * int64".into()),
        typedef: Some("N * Any".into()),
        dtypedef: Some("int64".into()),
        ..TypeHints::default()
    };
    assert!(matches!(
        Container::new(&v, hints, None),
        Err(Error::ConflictingHints { .. })
    ));
}

#[test]
fn test_device_normalization() {
    let d = DeviceSpec::parse("cuda:0").unwrap();
    assert_eq!((d.name(), d.index()), ("cuda", 0));

    let d = DeviceSpec::parse("cuda:managed").unwrap();
    assert_eq!((d.name(), d.index()), ("cuda", MANAGED));

    assert!(DeviceSpec::parse("cuda").is_err());
    assert!(DeviceSpec::parse("cuda:0:0").is_err());
    assert!(DeviceSpec::parse("cuda:minus-one").is_err());

    let v = Value::from(vec![1, 2]);
    let c = Container::new(&v, TypeHints::none(), Some("cuda:managed")).unwrap();
    assert_eq!(c.device().unwrap().to_string(), "cuda:managed");

    assert!(Container::new(&v, TypeHints::none(), Some("bogus")).is_err());
}

#[test]
fn test_empty_allocation_is_zeroed() {
    let c = Container::empty("6 * uint8", None).unwrap();
    assert_eq!(c.value().unwrap(), Value::from(vec![0, 0, 0, 0, 0, 0]));

    // Ragged types have no static size.
    assert!(Container::empty("var * int64", None).is_err());
}

#[test]
fn test_unchecked_buffer_import() {
    let c = Container::from_buffer_unchecked(Arc::new(*b"123"), "3 * uint8").unwrap();
    assert_eq!(c.value().unwrap(), Value::from(vec![49, 50, 51]));
}

#[test]
fn test_checked_buffer_import_validates_size() {
    let c = Container::from_buffer(Arc::new(*b"123"), "3 * uint8").unwrap();
    assert_eq!(c.value().unwrap(), Value::from(vec![49, 50, 51]));

    match Container::from_buffer(Arc::new(*b"123"), "4 * uint8") {
        Err(Error::BufferValidation { expected, got, .. }) => {
            assert_eq!((expected, got), (4, 3));
        }
        other => panic!("expected BufferValidation, got {other:?}"),
    }
}

#[test]
fn test_copy_contiguous_round_trips() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4]]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    let copy = c.copy_contiguous(None).unwrap();
    assert_eq!(copy.value().unwrap(), v);
    assert!(!copy.memory_eq(&c));
}

#[test]
fn test_copy_contiguous_casts_dtype() {
    let v = Value::from(vec![1, 2, 3]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    let copy = c.copy_contiguous(Some("float64")).unwrap();
    assert_eq!(copy.ty().to_string(), "3 * float64");
    assert_eq!(copy.value().unwrap(), Value::from(vec![1.0, 2.0, 3.0]));
}

#[test]
fn test_reshape_is_zero_copy_view() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    let r = c.reshape(&[3, 2], None).unwrap();
    assert_eq!(r.ty().to_string(), "3 * 2 * int64");
    assert_eq!(
        r.value().unwrap(),
        Value::from(vec![vec![1, 2], vec![3, 4], vec![5, 6]])
    );
    assert!(r.memory_eq(&c));

    assert!(c.reshape(&[4, 2], None).is_err());
}

#[test]
fn test_reshape_to_same_shape_is_identity() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    let r = c.reshape(&[2, 3], Some(MemoryOrder::RowMajor)).unwrap();
    assert_eq!(r.ty(), c.ty());
    assert_eq!(r.value().unwrap(), c.value().unwrap());
    assert!(r.memory_eq(&c));
}

#[test]
fn test_reshape_shares_mutations_with_views() {
    let v = Value::from(vec![1.0, 2.0, 3.0, 4.0]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    let view = c.reshape(&[2, 2], None).unwrap();

    use ragbox::array::Array;
    use ragbox::ops::BinaryKind;
    let a = Array::from(c.clone());
    let b = Array::new(&v, TypeHints::none(), None).unwrap();
    a.binary_in_place(BinaryKind::Add, &b).unwrap();

    // The reshaped view aliases the same block and sees the update.
    assert_eq!(
        view.value().unwrap(),
        Value::from(vec![vec![2.0, 4.0], vec![6.0, 8.0]])
    );
}

#[test]
fn test_strides_row_major() {
    let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    assert_eq!(c.strides().unwrap(), vec![24, 8]);
}

#[test]
fn test_repr_is_bounded() {
    let v = Value::from((0..25).collect::<Vec<i64>>());
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    let repr = c.to_string();
    assert!(repr.starts_with("container([0, 1, 2,"));
    assert!(repr.contains("..."));
    assert!(repr.ends_with("type=\"25 * int64\")"));
}

#[test]
fn test_optional_values_round_trip() {
    let v = Value::List(vec![Value::Int(1), Value::None, Value::Int(3)]);
    let c = Container::new(&v, TypeHints::none(), None).unwrap();
    assert_eq!(c.ty().to_string(), "3 * ?int64");
    assert_eq!(c.value().unwrap(), v);
}

#[test]
fn test_value_type_mismatch_is_reported() {
    let v = Value::from(vec![1, 2, 3]);
    match Container::new(&v, TypeHints::with_type("4 * int64"), None) {
        Err(Error::TypeMismatch { .. }) => {}
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}
