use std::sync::Arc;

use ragbox::array::Array;
use ragbox::container::TypeHints;
use ragbox::device::DeviceSpec;
use ragbox::error::Error;
use ragbox::ops::dispatch::{select, ModuleKind};
use ragbox::ops::{BinaryKind, UnaryKind};
use ragbox::value::Value;

fn array(v: Value) -> Array {
    Array::new(&v, TypeHints::none(), None).unwrap()
}

fn array_on(v: Value, device: &str) -> Array {
    Array::new(&v, TypeHints::none(), Some(device)).unwrap()
}

fn floats(v: &Value) -> Vec<f64> {
    match v {
        Value::List(items) => items
            .iter()
            .map(|x| match x {
                Value::Float(f) => *f,
                other => panic!("expected float, got {other:?}"),
            })
            .collect(),
        other => panic!("expected list, got {other:?}"),
    }
}

#[test]
fn test_unary_dispatch_stays_general_off_managed() {
    let cpu = DeviceSpec::parse("cpu:0").unwrap();
    assert_eq!(select([Some(&cpu)]).kind(), ModuleKind::General);
    assert_eq!(select([None]).kind(), ModuleKind::General);
}

#[test]
fn test_binary_dispatch_routing() {
    let managed = DeviceSpec::parse("cuda:managed").unwrap();
    let cpu = DeviceSpec::parse("cpu:0").unwrap();
    let gpu2 = DeviceSpec::parse("cuda:2").unwrap();

    // Both managed: the managed set.
    assert_eq!(
        select([Some(&managed), Some(&managed)]).kind(),
        ModuleKind::ManagedGpu
    );
    // Two different non-managed devices: the general set.
    assert_eq!(select([Some(&cpu), Some(&gpu2)]).kind(), ModuleKind::General);
    // Managed mixed with anything else: the general set.
    assert_eq!(
        select([Some(&managed), Some(&cpu)]).kind(),
        ModuleKind::General
    );
}

#[test]
fn test_managed_operands_compute() {
    let a = array_on(Value::from(vec![1.0, 2.0, 3.0]), "cuda:managed");
    let b = array_on(Value::from(vec![10.0, 20.0, 30.0]), "cuda:managed");
    let c = a.binary(BinaryKind::Add, &b).unwrap();
    assert_eq!(c.to_value().unwrap(), Value::from(vec![11.0, 22.0, 33.0]));
    assert_eq!(c.device().unwrap().to_string(), "cuda:managed");
}

#[test]
fn test_cross_device_operands_compute_on_general() {
    let a = array_on(Value::from(vec![1, 2]), "cpu:0");
    let b = array_on(Value::from(vec![3, 4]), "cuda:1");
    let c = a.binary(BinaryKind::Add, &b).unwrap();
    assert_eq!(c.to_value().unwrap(), Value::from(vec![4, 6]));
}

#[test]
fn test_integer_arithmetic() {
    let a = array(Value::from(vec![7, -7, 9]));
    let b = array(Value::from(vec![2, 2, -3]));

    assert_eq!(
        (&a + &b).to_value().unwrap(),
        Value::from(vec![9, -5, 6])
    );
    assert_eq!(
        (&a - &b).to_value().unwrap(),
        Value::from(vec![5, -9, 12])
    );
    assert_eq!(
        (&a * &b).to_value().unwrap(),
        Value::from(vec![14, -14, -27])
    );
    // Floor division and remainder follow the divisor's sign.
    assert_eq!(
        a.floor_divide(&b).unwrap().to_value().unwrap(),
        Value::from(vec![3, -4, -3])
    );
    assert_eq!(
        a.remainder(&b).unwrap().to_value().unwrap(),
        Value::from(vec![1, 1, 0])
    );
}

#[test]
fn test_divide_produces_floats() {
    let a = array(Value::from(vec![4, 10]));
    let b = array(Value::from(vec![2, 4]));
    let c = (&a / &b).into_container();
    assert_eq!(c.ty().to_string(), "2 * float64");
    assert_eq!(c.value().unwrap(), Value::from(vec![2.0, 2.5]));
}

#[test]
fn test_divmod_pair() {
    let a = array(Value::from(vec![7, -7]));
    let b = array(Value::from(vec![2, 2]));
    let (q, r) = a.divmod(&b).unwrap();
    assert_eq!(q.to_value().unwrap(), Value::from(vec![3, -4]));
    assert_eq!(r.to_value().unwrap(), Value::from(vec![1, 1]));
}

#[test]
fn test_in_place_add_keeps_identity() {
    let mut a = array(Value::from(vec![1.0, 2.0, 3.0]));
    let before = a.clone();
    let b = array(Value::from(vec![10.0, 20.0, 30.0]));

    a += &b;

    assert!(a.memory_eq(before.container()));
    assert_eq!(a.to_value().unwrap(), Value::from(vec![11.0, 22.0, 33.0]));
    // The pre-existing view aliases the same block and sees the update.
    assert_eq!(
        before.to_value().unwrap(),
        Value::from(vec![11.0, 22.0, 33.0])
    );
}

#[test]
fn test_in_place_divmod_writes_quotient() {
    let a = array(Value::from(vec![7, 9]));
    let b = array(Value::from(vec![2, 4]));
    let (q, r) = a.divmod_in_place(&b).unwrap();
    assert!(q.memory_eq(a.container()));
    assert_eq!(a.to_value().unwrap(), Value::from(vec![3, 2]));
    assert_eq!(r.to_value().unwrap(), Value::from(vec![1, 1]));
}

#[test]
fn test_comparisons_produce_bool_arrays() {
    let a = array(Value::from(vec![1, 5, 3]));
    let b = array(Value::from(vec![2, 5, 1]));

    let eq = a.equal(&b).unwrap();
    assert_eq!(eq.ty().to_string(), "3 * bool");
    assert_eq!(
        eq.to_value().unwrap(),
        Value::from(vec![false, true, false])
    );
    assert_eq!(
        a.less(&b).unwrap().to_value().unwrap(),
        Value::from(vec![true, false, false])
    );
    assert_eq!(
        a.greater_equal(&b).unwrap().to_value().unwrap(),
        Value::from(vec![false, true, true])
    );
}

#[test]
fn test_equaln_treats_nan_as_equal() {
    let a = array(Value::from(vec![f64::NAN, 1.0]));
    let b = array(Value::from(vec![f64::NAN, 2.0]));
    assert_eq!(
        a.equaln(&b, None).unwrap().to_value().unwrap(),
        Value::from(vec![true, false])
    );
    assert_eq!(
        a.equal(&b).unwrap().to_value().unwrap(),
        Value::from(vec![false, false])
    );
}

#[test]
fn test_bitwise_ops() {
    let a = array(Value::from(vec![0b1100, 0b1010]));
    let b = array(Value::from(vec![0b1010, 0b0110]));
    assert_eq!(
        (&a & &b).to_value().unwrap(),
        Value::from(vec![0b1000, 0b0010])
    );
    assert_eq!(
        (&a | &b).to_value().unwrap(),
        Value::from(vec![0b1110, 0b1110])
    );
    assert_eq!(
        (&a ^ &b).to_value().unwrap(),
        Value::from(vec![0b0110, 0b1100])
    );

    let t = array(Value::from(vec![true, true, false]));
    let f = array(Value::from(vec![true, false, false]));
    assert_eq!(
        (&t & &f).to_value().unwrap(),
        Value::from(vec![true, false, false])
    );
}

#[test]
fn test_negation_and_inversion() {
    let a = array(Value::from(vec![1, -2, 3]));
    assert_eq!((-&a).to_value().unwrap(), Value::from(vec![-1, 2, -3]));
    assert_eq!((!&a).to_value().unwrap(), Value::from(vec![-2, 1, -4]));

    let b = array(Value::from(vec![true, false]));
    assert_eq!((!&b).to_value().unwrap(), Value::from(vec![false, true]));
}

#[test]
fn test_rounding_family() {
    let a = array(Value::from(vec![1.4, -1.6, 2.5]));
    assert_eq!(
        a.floor().unwrap().to_value().unwrap(),
        Value::from(vec![1.0, -2.0, 2.0])
    );
    assert_eq!(
        a.ceil().unwrap().to_value().unwrap(),
        Value::from(vec![2.0, -1.0, 3.0])
    );
    assert_eq!(
        a.trunc().unwrap().to_value().unwrap(),
        Value::from(vec![1.0, -1.0, 2.0])
    );
    assert_eq!(
        a.round().unwrap().to_value().unwrap(),
        Value::from(vec![1.0, -2.0, 3.0])
    );
}

#[test]
fn test_transcendentals_promote_ints_to_float64() {
    let a = array(Value::from(vec![0, 1]));
    let s = a.sin(None).unwrap();
    assert_eq!(s.ty().to_string(), "2 * float64");
    let got = floats(&s.to_value().unwrap());
    assert!((got[0] - 0.0).abs() < 1e-12);
    assert!((got[1] - 1.0_f64.sin()).abs() < 1e-12);
}

#[test]
fn test_tanh_and_tgamma_are_distinct() {
    let a = array(Value::from(vec![5.0]));
    let tanh = floats(&a.tanh(None).unwrap().to_value().unwrap());
    let tgamma = floats(&a.tgamma(None).unwrap().to_value().unwrap());
    assert!((tanh[0] - 5.0_f64.tanh()).abs() < 1e-12);
    // Gamma(5) = 4! = 24.
    assert!((tgamma[0] - 24.0).abs() < 1e-9);
    assert!((tanh[0] - tgamma[0]).abs() > 1.0);
}

#[test]
fn test_sqrt_and_exp() {
    let a = array(Value::from(vec![1.0, 4.0, 9.0]));
    assert_eq!(
        a.sqrt(None).unwrap().to_value().unwrap(),
        Value::from(vec![1.0, 2.0, 3.0])
    );
    let e = floats(&a.exp(None).unwrap().to_value().unwrap());
    assert!((e[0] - 1.0_f64.exp()).abs() < 1e-12);
}

#[test]
fn test_unary_out_parameter_is_returned() {
    let a = array(Value::from(vec![1.0, 2.0]));
    let out = Array::empty("2 * float64", None).unwrap();
    let res = a.copy(Some(&out)).unwrap();
    assert!(res.memory_eq(out.container()));
    assert_eq!(out.to_value().unwrap(), Value::from(vec![1.0, 2.0]));

    // A mistyped out is rejected.
    let bad = Array::empty("2 * int64", None).unwrap();
    assert!(a.copy(Some(&bad)).is_err());
}

#[test]
fn test_unsupported_operations_fail_fast() {
    let a = array(Value::from(vec![1, 2]));
    let b = array(Value::from(vec![3, 4]));

    for result in [
        a.matmul(&b),
        a.matmul_in_place(&b),
        a.power(&b),
        a.power_in_place(&b),
        a.shift_left(&b),
        a.shift_right(&b),
        a.abs(),
        a.to_bool(),
        a.to_int(),
        a.to_float(),
        a.to_complex(),
        a.to_index(),
    ] {
        match result {
            Err(Error::UnsupportedOperation { .. }) => {}
            other => panic!("expected UnsupportedOperation, got {other:?}"),
        }
    }
}

#[test]
fn test_shape_mismatch_panics_through_operator_sugar() {
    let result = std::panic::catch_unwind(|| {
        let a = array(Value::from(vec![1, 2, 3]));
        let b = array(Value::from(vec![1, 2]));
        let _ = &a + &b;
    });
    assert!(result.is_err());
}

#[test]
fn test_mismatched_dtypes_are_rejected() {
    let a = array(Value::from(vec![1, 2]));
    let b = array(Value::from(vec![1.0, 2.0]));
    assert!(matches!(
        a.binary(BinaryKind::Add, &b),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_in_place_on_imported_buffer_is_rejected() {
    let a = Array::from_buffer_unchecked(Arc::new(*b"123"), "3 * uint8").unwrap();
    let b = array(Value::from(vec![1, 1, 1]));
    let b = b.into_container().copy_contiguous(Some("uint8")).map(Array::from).unwrap();
    assert!(a.binary_in_place(BinaryKind::Add, &b).is_err());
    // The non-mutating form still works.
    assert_eq!(
        a.binary(BinaryKind::Add, &b).unwrap().to_value().unwrap(),
        Value::from(vec![50, 51, 52])
    );
}

#[test]
fn test_copy_unary_kind_preserves_type() {
    let a = array(Value::from(vec![vec![1, 2], vec![3, 4]]));
    let c = a.unary(UnaryKind::Copy, None).unwrap();
    assert_eq!(c.ty(), a.ty());
    assert_eq!(c.to_value().unwrap(), a.to_value().unwrap());
    assert!(!c.memory_eq(a.container()));
}

#[test]
fn test_positive_is_a_copy() {
    let a = array(Value::from(vec![1, 2]));
    let p = a.positive().unwrap();
    assert_eq!(p.to_value().unwrap(), a.to_value().unwrap());
    assert!(!p.memory_eq(a.container()));
}
