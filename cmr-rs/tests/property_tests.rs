use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Value};

use cmr::backend::{serial, udp};
use cmr::controller::{Button, ControllerState, Stick};
use cmr::script::command::parse_commands;
use cmr::script::index::{build_if_map, build_while_map, Strictness};
use cmr::script::{evaluate, Num, Script};
use cmr::var::VarStore;

// ── Script generators ─────────────────────────────────────────────────────────

/// A balanced if/while tree rendered as command records.
#[derive(Debug, Clone)]
enum Block {
    Wait,
    If(Vec<Block>),
    While(Vec<Block>),
}

fn block() -> impl Strategy<Value = Block> {
    let leaf = Just(Block::Wait);
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Block::If),
            prop::collection::vec(inner, 0..4).prop_map(Block::While),
        ]
    })
}

fn render(blocks: &[Block], out: &mut Vec<Value>) {
    for b in blocks {
        match b {
            Block::Wait => out.push(json!({"cmd": "wait", "ms": 0})),
            Block::If(body) => {
                out.push(json!({"cmd": "if", "left": 1, "op": "==", "right": 1}));
                render(body, out);
                out.push(json!({"cmd": "end_if"}));
            }
            Block::While(body) => {
                out.push(json!({"cmd": "while", "left": 1, "op": "==", "right": 0}));
                render(body, out);
                out.push(json!({"cmd": "end_while"}));
            }
        }
    }
}

fn script_of(blocks: &[Block]) -> Vec<Value> {
    let mut out = Vec::new();
    render(blocks, &mut out);
    out
}

proptest! {
    /// Balanced if/end_if pairs map one to one, openers before closers,
    /// with nothing left over.
    #[test]
    fn balanced_if_map_is_a_bijection(blocks in prop::collection::vec(block(), 0..6)) {
        let records = script_of(&blocks);
        let ifs = records.iter().filter(|r| r["cmd"] == "if").count();
        let commands = parse_commands(Value::Array(records)).unwrap();

        let (map, unclosed) = build_if_map(&commands, Strictness::Strict).unwrap();
        prop_assert!(unclosed.is_empty());
        prop_assert_eq!(map.len(), ifs);
        let closers: BTreeSet<usize> = map.values().copied().collect();
        prop_assert_eq!(closers.len(), ifs);
        for (open, close) in &map {
            prop_assert!(open < close);
            prop_assert!(matches!(commands[*close], cmr::script::Command::EndIf(_)));
        }
    }

    /// One stray end_while is reported in tolerant mode and rejected in
    /// strict mode.
    #[test]
    fn stray_end_while(blocks in prop::collection::vec(block(), 0..4), at in 0usize..64) {
        let mut records = script_of(&blocks);
        let at = at % (records.len() + 1);
        // Only insert where the while nesting depth is zero.
        let depth_at = |i: usize| {
            records[..i].iter().fold(0i32, |d, r| match r["cmd"].as_str() {
                Some("while") => d + 1,
                Some("end_while") => d - 1,
                _ => d,
            })
        };
        prop_assume!(depth_at(at) == 0);
        records.insert(at, json!({"cmd": "end_while"}));
        let commands = parse_commands(Value::Array(records)).unwrap();

        let (_, _, unclosed) = build_while_map(&commands, Strictness::Tolerant).unwrap();
        prop_assert_eq!(unclosed, vec![at]);
        prop_assert!(build_while_map(&commands, Strictness::Strict).is_err());
    }

    /// Loading never panics on arbitrary command records.
    #[test]
    fn loader_does_not_panic(names in prop::collection::vec("[a-z_]{1,12}", 0..8)) {
        let records: Vec<Value> = names.iter().map(|n| json!({"cmd": n})).collect();
        let _ = Script::from_value(Value::Array(records), Strictness::Tolerant);
    }
}

// ── Encoders ──────────────────────────────────────────────────────────────────

fn buttons() -> impl Strategy<Value = BTreeSet<Button>> {
    prop::collection::btree_set(prop::sample::select(Button::ALL.to_vec()), 0..12)
}

proptest! {
    #[test]
    fn serial_button_bits_round_trip(set in buttons()) {
        let (high, low) = serial::buttons_to_bytes(&set);
        let back: BTreeSet<Button> = serial::bytes_to_buttons(high, low).into_iter().collect();
        prop_assert_eq!(back, set);
    }

    #[test]
    fn serial_packet_has_header(set in buttons()) {
        let mut state = ControllerState::new();
        state.buttons = set;
        prop_assert_eq!(serial::encode_state(&state)[0], serial::STATE_HEADER);
    }

    /// Every button pressed clears exactly its own bit in the idle mask.
    #[test]
    fn udp_pad_is_inverted(set in buttons()) {
        let field = udp::encode_pad(&set);
        prop_assert_eq!(field & !udp::PAD_IDLE, 0);
        for b in Button::ALL {
            prop_assert_eq!(field & udp::pad_bit(b) == 0, set.contains(&b));
        }
    }

    /// Axes never wrap: each 12-bit field stays in range and moves with
    /// the sign of its input.
    #[test]
    fn circle_pad_saturates(x in -10.0f64..10.0, y in -10.0f64..10.0) {
        let field = udp::encode_circle_pad(Stick { x, y });
        let ex = field & 0xFFF;
        let ey = (field >> 12) & 0xFFF;
        prop_assert!(field >> 24 == 0);
        if x > 0.0 { prop_assert!(ex >= 0x800); }
        if x < 0.0 { prop_assert!(ex <= 0x800); }
        if y > 0.0 { prop_assert!(ey >= 0x800); }
        if y < 0.0 { prop_assert!(ey <= 0x800); }
    }

    #[test]
    fn udp_packet_fields_round_trip(set in buttons(), x in -1.0f64..1.0) {
        let mut state = ControllerState::new();
        state.buttons = set.clone();
        state.left_stick = Stick::new(x, 0.0);
        let fields = udp::decode_fields(&udp::encode_packet(&state));
        prop_assert_eq!(fields[0], udp::encode_pad(&set));
        prop_assert_eq!(fields[1], udp::TOUCH_NONE);
        prop_assert_eq!(fields[2], udp::encode_circle_pad(state.left_stick));
        prop_assert_eq!(fields[3], udp::CSTICK_NEUTRAL);
        prop_assert_eq!(fields[4], 0);
    }
}

#[test]
fn circle_pad_reference_points() {
    assert_eq!(udp::encode_circle_pad(Stick::new(0.0, 0.0)), udp::CIRCLE_NEUTRAL);
    let full_right = udp::encode_circle_pad(Stick::new(1.0, 0.0));
    assert_eq!(full_right & 0xFFF, 0xFFF);
    assert_eq!((full_right >> 12) & 0xFFF, 0x800);
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

fn vars(a: i64, b: i64) -> VarStore {
    let mut v = VarStore::new();
    v.set("a", a);
    v.set("b", b);
    v
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

proptest! {
    #[test]
    fn integer_arithmetic_matches(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let v = vars(a, b);
        prop_assert_eq!(evaluate("$a + $b", &v).unwrap(), Num::Int(a + b));
        prop_assert_eq!(evaluate("$a - $b", &v).unwrap(), Num::Int(a - b));
        prop_assert_eq!(evaluate("$a * $b", &v).unwrap(), Num::Int(a * b));
    }

    #[test]
    fn floor_division_rounds_down(a in -10_000i64..10_000, b in -100i64..100) {
        prop_assume!(b != 0);
        let v = vars(a, b);
        prop_assert_eq!(evaluate("$a // $b", &v).unwrap(), Num::Int(floor_div(a, b)));
    }

    /// Arbitrary text either evaluates or fails; it never panics.
    #[test]
    fn evaluator_does_not_panic(s in "\\PC{0,40}") {
        let _ = evaluate(&s, &VarStore::new());
    }
}
