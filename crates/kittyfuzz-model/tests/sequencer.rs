//! End-to-end properties of the mutation stream: determinism, total
//! enumeration, skip equivalence, offsets, calculated fields, and the
//! pinned byte-level scenarios.

use kittyfuzz_model::{
    equal, u16_be, BitField, Checksum, ChecksumAlgorithm, CloneOf, Condition, Container, Delimiter,
    Dynamic, ElementCount, Field, ForEach, Group, HashField, If, IfNot, IndexOf, ModelError,
    RandomBits, RandomBytes, Repeat, Size, Static, StringField, Template,
};
use std::collections::HashMap;

fn template(root: impl Into<Field>) -> Template {
    Template::new("t", root.into()).expect("valid template")
}

fn all_renderings(t: &mut Template) -> Vec<Vec<u8>> {
    t.reset();
    let mut out = Vec::new();
    while t.mutate() {
        out.push(t.render_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Pinned scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_bitfield_u8_default_zero() {
    let mut t = template(Container::new(vec![BitField::new(0, 8).into()]));
    assert_eq!(t.render_bytes(), vec![0x00]);
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), vec![0x01]);
    let total = t.num_mutations();
    t.reset();
    for _ in 0..total {
        assert!(t.mutate());
    }
    assert!(!t.mutate());
    assert!(!t.mutate());
}

#[test]
fn scenario_string_kitty_library() {
    let mut t = template(Container::new(vec![StringField::new("kitty").into()]));
    assert_eq!(t.render_bytes(), b"kitty");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"kittykitty");
    let all = all_renderings(&mut t);
    assert!(all.iter().any(|r| r.is_empty()));
    assert!(all.iter().any(|r| r == &b"%s".repeat(10)));
    assert!(all
        .iter()
        .any(|r| r == &b"/../../../../../../../../../../../../etc/passwd".to_vec()));
}

#[test]
fn scenario_container_uint16_then_string() {
    let mut t = template(Container::new(vec![
        u16_be(0x1234).with_name("id").into(),
        StringField::new("a").with_name("s").into(),
    ]));
    assert_eq!(t.render_bytes(), vec![0x12, 0x34, 0x61]);

    let int_only = all_renderings(&mut template(Container::new(vec![u16_be(0x1234).into()])));
    let str_only = all_renderings(&mut template(Container::new(vec![StringField::new("a")
        .into()])));
    assert_eq!(
        t.num_mutations(),
        (int_only.len() + str_only.len()) as u64
    );

    // While the integer mutates the string stays "a", and vice versa.
    let all = all_renderings(&mut t);
    for (i, r) in all.iter().take(int_only.len()).enumerate() {
        assert_eq!(r[r.len() - 1], b'a', "mutation {i} should keep the string default");
        assert_eq!(&r[..r.len() - 1], &int_only[i][..]);
    }
    for (i, r) in all.iter().skip(int_only.len()).enumerate() {
        assert_eq!(&r[..2], &[0x12, 0x34], "string mutation {i} keeps the int default");
        assert_eq!(&r[2..], &str_only[i][..]);
    }
}

#[test]
fn scenario_size_of_string() {
    let mut t = template(Container::new(vec![
        Size::new("x", 32).into(),
        Group::new(["hello", "hi"]).with_name("x").into(),
    ]));
    assert_eq!(
        t.render_bytes(),
        vec![0x00, 0x00, 0x00, 0x05, 0x68, 0x65, 0x6c, 0x6c, 0x6f]
    );
    // Group mutation 1 switches the dependency to "hi".
    assert!(t.mutate());
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), vec![0x00, 0x00, 0x00, 0x02, 0x68, 0x69]);
}

#[test]
fn scenario_crc32_checksum() {
    let mut t = template(Container::new(vec![
        Checksum::new("x", 32).into(),
        Static::new("123456789").with_name("x").into(),
    ]));
    assert_eq!(
        t.render_bytes(),
        vec![0xcb, 0xf4, 0x39, 0x26, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39]
    );
}

// ---------------------------------------------------------------------------
// Stream properties
// ---------------------------------------------------------------------------

#[test]
fn determinism_two_runs_identical() {
    let build = || {
        template(Container::new(vec![
            u16_be(7).into(),
            Delimiter::new(" ").into(),
            StringField::new("abc").with_max_size(64).into(),
        ]))
    };
    let a = all_renderings(&mut build());
    let b = all_renderings(&mut build());
    assert_eq!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn skip_equivalence() {
    let build = || {
        template(Container::new(vec![
            BitField::new(3, 8).into(),
            StringField::new("xy").with_max_size(40).into(),
        ]))
    };
    let mut reference = build();
    let total = reference.num_mutations();
    for i in [0, 1, 7, total / 2, total - 1] {
        let mut by_mutate = build();
        for _ in 0..=i {
            assert!(by_mutate.mutate());
        }
        let mut by_skip = build();
        assert_eq!(by_skip.skip(i + 1), i + 1);
        assert_eq!(by_skip.render_bytes(), by_mutate.render_bytes(), "index {i}");
        assert_eq!(by_skip.current_index(), by_mutate.current_index());
    }
}

#[test]
fn skip_past_end_reports_actual() {
    let mut t = template(Container::new(vec![Group::new(["a", "b", "c"]).into()]));
    let total = t.num_mutations();
    assert_eq!(t.skip(total + 100), total);
    assert!(!t.mutate());
}

#[test]
fn default_invariance_and_idempotent_render() {
    let mut t = template(Container::new(vec![
        StringField::new("abc").into(),
        BitField::new(1, 16).into(),
    ]));
    let d1 = t.render_bytes();
    let d2 = t.render_bytes();
    assert_eq!(d1, d2);
    t.mutate();
    let m1 = t.render_bytes();
    let m2 = t.render_bytes();
    assert_eq!(m1, m2);
    t.reset();
    assert_eq!(t.render_bytes(), d1);
}

#[test]
fn single_field_mutations_pairwise_distinct() {
    let mut t = template(Container::new(vec![StringField::new("q").into()]));
    let all = all_renderings(&mut t);
    let unique: std::collections::HashSet<&Vec<u8>> = all.iter().collect();
    assert_eq!(unique.len(), all.len());

    let mut t = template(Container::new(vec![BitField::new(9, 8).into()]));
    let all = all_renderings(&mut t);
    let unique: std::collections::HashSet<&Vec<u8>> = all.iter().collect();
    assert_eq!(unique.len(), all.len());
}

#[test]
fn max_size_filters_without_renumbering() {
    let unlimited = all_renderings(&mut template(Container::new(vec![StringField::new("ab")
        .into()])));
    let limited = all_renderings(&mut template(Container::new(vec![StringField::new("ab")
        .with_max_size(6)
        .into()])));
    assert!(limited.len() < unlimited.len());
    // The limited stream is the unlimited one with long entries removed.
    let filtered: Vec<&Vec<u8>> = unlimited.iter().filter(|r| r.len() <= 6).collect();
    assert_eq!(limited.len(), filtered.len());
    for (a, b) in limited.iter().zip(filtered) {
        assert_eq!(a, b);
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

#[test]
fn conditional_renders_empty_but_still_counts() {
    let active = template(Container::new(vec![
        Group::new(["on", "off"]).with_name("switch").into(),
        If::new(
            equal("switch", "on"),
            vec![StringField::new("inner").with_name("guarded").into()],
        )
        .into(),
    ]));
    let inactive = template(Container::new(vec![
        Group::new(["off", "on"]).with_name("switch").into(),
        If::new(
            equal("switch", "on"),
            vec![StringField::new("inner").with_name("guarded").into()],
        )
        .into(),
    ]));
    // Same index space either way.
    assert_eq!(active.num_mutations(), inactive.num_mutations());

    let mut active = active;
    let mut inactive = inactive;
    assert_eq!(active.render_bytes(), b"oninner");
    assert_eq!(inactive.render_bytes(), b"off");
}

#[test]
fn if_not_inverts() {
    let mut t = template(Container::new(vec![
        Group::new(["on"]).with_name("switch").into(),
        IfNot::new(equal("switch", "on"), vec![Static::new("X").into()]).into(),
    ]));
    assert_eq!(t.render_bytes(), b"on");
    let mut t = template(Container::new(vec![
        Group::new(["off"]).with_name("switch").into(),
        IfNot::new(equal("switch", "on"), vec![Static::new("X").into()]).into(),
    ]));
    assert_eq!(t.render_bytes(), b"offX");
}

#[test]
fn constant_conditions() {
    let mut never = template(Container::new(vec![
        If::new(Condition::False, vec![Static::new("X").into()]).into(),
        Static::new("tail").into(),
    ]));
    assert_eq!(never.render_bytes(), b"tail");
    let mut always = template(Container::new(vec![
        If::new(Condition::True, vec![Static::new("X").into()]).into(),
        Static::new("tail").into(),
    ]));
    assert_eq!(always.render_bytes(), b"Xtail");
}

#[test]
fn repeat_count_mutations_come_first() {
    let mut t = template(
        Repeat::new(vec![Static::new("ab").into()])
            .times(1, 4),
    );
    // Count dimension: (4-1)/1 = 3 mutations rendering 2, 3, 4 copies.
    assert_eq!(t.num_mutations(), 3);
    assert_eq!(t.render_bytes(), b"ab");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"abab");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"ababab");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"abababab");
    assert!(!t.mutate());
}

#[test]
fn repeat_inner_mutations_render_min_times() {
    let mut t = template(
        Repeat::new(vec![Group::new(["a", "b"]).into()])
            .times(2, 3),
    );
    // 1 count mutation + 2 group mutations.
    assert_eq!(t.num_mutations(), 3);
    assert_eq!(t.render_bytes(), b"aa");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"aaa");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"aa");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"bb");
    assert!(!t.mutate());
}

#[test]
fn foreach_cross_product() {
    let mut t = template(Container::new(vec![
        Group::new(["1", "2", "3"]).with_name("outer").into(),
        ForEach::new("outer", vec![Group::new(["a", "b", "c"]).with_name("inner").into()]).into(),
    ]));
    // outer: 3 own mutations; foreach: 3 * 3.
    assert_eq!(t.num_mutations(), 3 + 9);
    let all = all_renderings(&mut t);
    let expected: Vec<Vec<u8>> = vec![
        // Outer's own walk, inner at default.
        b"1a".to_vec(), b"2a".to_vec(), b"3a".to_vec(),
        // Cross product.
        b"1a".to_vec(), b"1b".to_vec(), b"1c".to_vec(),
        b"2a".to_vec(), b"2b".to_vec(), b"2c".to_vec(),
        b"3a".to_vec(), b"3b".to_vec(), b"3c".to_vec(),
    ];
    assert_eq!(all, expected);
}

#[test]
fn foreach_hidden_driver() {
    let mut t = template(Container::new(vec![ForEach::over(
        Group::new(["1", "2"]),
        vec![Group::new(["a", "b"]).into()],
    )
    .into()]));
    assert_eq!(t.num_mutations(), 4);
    let all = all_renderings(&mut t);
    // The driver itself never renders.
    assert_eq!(all, vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"b".to_vec()]);
}

// ---------------------------------------------------------------------------
// Calculated fields
// ---------------------------------------------------------------------------

#[test]
fn clone_tracks_dependency() {
    let mut t = template(Container::new(vec![
        Group::new(["ping", "pong"]).with_name("word").into(),
        Static::new("/").into(),
        CloneOf::new("word").into(),
    ]));
    assert_eq!(t.render_bytes(), b"ping/ping");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"ping/ping");
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), b"pong/pong");
}

#[test]
fn inclusive_size_is_self_consistent() {
    // The size field counts the container it lives in; the fallback is a
    // zero value of the same width, so the total length is already right
    // on the first render.
    let mut t = template(
        Container::new(vec![
            Size::new("frame", 32).into(),
            Static::new("payload").into(),
        ])
        .with_name("frame"),
    );
    let rendered = t.render_bytes();
    // 4 size bytes + 7 payload bytes.
    assert_eq!(rendered.len(), 11);
    assert_eq!(&rendered[..4], &[0x00, 0x00, 0x00, 0x0b]);
    assert_eq!(&rendered[4..], b"payload");
    // Idempotent.
    assert_eq!(t.render_bytes(), rendered);
}

#[test]
fn size_in_bits_counts_bits() {
    let mut t = template(Container::new(vec![
        Size::in_bits("x", 16).into(),
        Static::new("abc").with_name("x").into(),
    ]));
    assert_eq!(t.render_bytes(), vec![0x00, 24, 0x61, 0x62, 0x63]);
}

#[test]
fn hash_field_renders_digest() {
    let mut t = template(Container::new(vec![
        Static::new("kitty").with_name("x").into(),
        HashField::md5("x").into(),
    ]));
    let rendered = t.render_bytes();
    assert_eq!(&rendered[..5], b"kitty");
    assert_eq!(
        hex::encode(&rendered[5..]),
        "cd880b726e0a0dbd4237f10d15da46f4"
    );
}

#[test]
fn element_count_sees_conditional_emptiness() {
    let build = |switch: &str| {
        template(Container::new(vec![
            ElementCount::new("list", 8).into(),
            Container::new(vec![
                Static::new("a").into(),
                Static::new("b").into(),
                If::new(
                    equal("switch", "on"),
                    vec![Static::new("c").into()],
                )
                .into(),
            ])
            .with_name("list")
            .into(),
            Group::new([switch]).with_name("switch").into(),
        ]))
    };
    assert_eq!(build("on").render_bytes(), b"\x03abcon");
    assert_eq!(build("off").render_bytes(), b"\x02aboff");
}

#[test]
fn index_of_reports_position() {
    let mut t = template(Container::new(vec![
        IndexOf::new("target", 8).into(),
        Static::new("a").into(),
        Static::new("b").into(),
        Static::new("target-value").with_name("target").into(),
    ]));
    let rendered = t.render_bytes();
    // The IndexOf field itself renders (index byte), then a, b, target.
    // Position among rendered leaves of the enclosing container: the
    // index field is 0, so the target sits at 3.
    assert_eq!(rendered[0], 3);
}

#[test]
fn adler32_checksum() {
    let mut t = template(Container::new(vec![
        Checksum::new("x", 32)
            .with_algorithm(ChecksumAlgorithm::Adler32)
            .into(),
        Static::new("Wikipedia").with_name("x").into(),
    ]));
    let rendered = t.render_bytes();
    assert_eq!(&rendered[..4], &[0x11, 0xe6, 0x03, 0x98]);
}

#[test]
fn fuzzable_size_probes_the_calculated_value() {
    let mut t = template(Container::new(vec![
        Size::new("x", 8).fuzzable(true).into(),
        Static::new("payload").with_name("x").into(),
    ]));
    assert!(t.num_mutations() > 0);
    // Default: the true size, 7 bytes.
    assert_eq!(t.render_bytes()[0], 7);
    // First probe flips bit 0 of the freshly calculated value.
    assert!(t.mutate());
    assert_eq!(t.render_bytes()[0], 6);
    // Frozen for the duration of the mutation.
    assert_eq!(t.render_bytes()[0], 6);
    t.reset();
    assert_eq!(t.render_bytes()[0], 7);
}

#[test]
fn signed_multibyte_fails_construction() {
    use kittyfuzz_model::{Endianness, IntEncoder};
    let err = Template::new(
        "t",
        Container::new(vec![BitField::new(-1, 16)
            .signed(true)
            .with_encoder(IntEncoder::MultiByte(Endianness::Big))
            .into()]),
    );
    assert!(matches!(err, Err(ModelError::Encoding(_))));
}

#[test]
fn unresolved_dependency_fails_construction() {
    let err = Template::new(
        "t",
        Container::new(vec![Size::new("nowhere", 32).into()]),
    );
    assert!(matches!(err, Err(ModelError::UnresolvedDependency(_))));
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

#[test]
fn static_never_mutates() {
    let mut t = template(Container::new(vec![Static::new("fixed").into()]));
    assert_eq!(t.num_mutations(), 0);
    assert!(!t.mutate());
    assert_eq!(t.render_bytes(), b"fixed");
}

#[test]
fn group_walks_its_values() {
    let mut t = template(Container::new(vec![Group::new(["GET", "PUT", "POST"]).into()]));
    assert_eq!(t.num_mutations(), 3);
    let all = all_renderings(&mut t);
    assert_eq!(all, vec![b"GET".to_vec(), b"PUT".to_vec(), b"POST".to_vec()]);
}

#[test]
fn dynamic_value_from_session_data() {
    let mut t = template(Container::new(vec![Dynamic::new("token", "default!")
        .with_name("tok")
        .into()]));
    assert_eq!(t.render_bytes(), b"default!");
    let mut data = HashMap::new();
    data.insert("token".to_string(), b"supplied".to_vec());
    t.set_session_data(&data);
    assert_eq!(t.render_bytes(), b"supplied");
    t.reset();
    assert_eq!(t.render_bytes(), b"default!");
}

#[test]
fn dynamic_fuzzable_flips_bits() {
    let mut t = template(Container::new(vec![Dynamic::new("k", vec![0u8, 0u8])
        .with_length(2)
        .fuzzable(true)
        .into()]));
    assert_eq!(t.num_mutations(), 16);
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), vec![0x80, 0x00]);
    // Idempotent render with a flipped bit.
    assert_eq!(t.render_bytes(), vec![0x80, 0x00]);
    assert!(t.mutate());
    assert_eq!(t.render_bytes(), vec![0x40, 0x00]);
}

#[test]
fn random_bytes_reproducible_across_resets() {
    let mut t = template(Container::new(vec![RandomBytes::new("seed-me", 2, 9)
        .with_seed(99)
        .with_num_mutations(10)
        .into()]));
    assert_eq!(t.num_mutations(), 10);
    let first = all_renderings(&mut t);
    let second = all_renderings(&mut t);
    assert_eq!(first, second);
    for r in &first {
        assert!(r.len() >= 2 && r.len() <= 9);
    }
}

#[test]
fn random_bits_step_walks_lengths() {
    let mut t = template(Container::new(vec![RandomBits::new("ab", 0, 16)
        .with_step(4)
        .into()]));
    // (16 - 0) / 4 = 4 mutations with bit lengths 0, 4, 8, 12.
    assert_eq!(t.num_mutations(), 4);
    t.reset();
    let mut lengths = Vec::new();
    while t.mutate() {
        lengths.push(t.render().len());
    }
    assert_eq!(lengths, vec![0, 4, 8, 12]);
}

#[test]
fn random_constraints_fail_construction() {
    for (min, max) in [(5i64, 3i64), (-1, 8), (0, 0)] {
        let err = Template::new(
            "t",
            Container::new(vec![RandomBytes::new("x", min, max).into()]),
        );
        assert!(matches!(err, Err(ModelError::InvalidParameter(_))), "{min}..{max}");
    }
    let err = Template::new(
        "t",
        Container::new(vec![RandomBytes::new("x", 0, 8).with_step(-2).into()]),
    );
    assert!(matches!(err, Err(ModelError::InvalidParameter(_))));
}

#[test]
fn bitfield_explicit_bounds_checked() {
    assert!(Template::new(
        "t",
        Container::new(vec![BitField::new(10, 8).with_max_value(5).into()]),
    )
    .is_err());
    assert!(Template::new(
        "t",
        Container::new(vec![BitField::new(0, 4).with_max_value(400).into()]),
    )
    .is_err());
    let t = Template::new(
        "t",
        Container::new(vec![BitField::new(3, 8)
            .with_min_value(1)
            .with_max_value(5)
            .into()]),
    )
    .expect("valid bounds");
    assert!(t.num_mutations() > 0);
}

#[test]
fn bitfield_mutations_respect_bounds() {
    let mut t = template(Container::new(vec![BitField::new(3, 8)
        .with_min_value(1)
        .with_max_value(5)
        .into()]));
    let all = all_renderings(&mut t);
    for r in all {
        assert!(r[0] >= 1 && r[0] <= 5, "value {} out of bounds", r[0]);
    }
}

// ---------------------------------------------------------------------------
// Offsets and info
// ---------------------------------------------------------------------------

#[test]
fn offsets_follow_rendered_layout() {
    let mut t = template(Container::new(vec![
        Static::new("ab").with_name("first").into(),
        Static::new("c").with_name("second").into(),
        Static::new("defg").with_name("third").into(),
    ]));
    t.render();
    let structure = t.get_structure();
    let children = structure["children"].as_array().expect("children");
    assert_eq!(children[0]["value/offset"], 0);
    assert_eq!(children[1]["value/offset"], 16);
    assert_eq!(children[2]["value/offset"], 24);
}

#[test]
fn get_info_describes_current_field() {
    let mut t = template(Container::new(vec![
        BitField::new(0, 8).with_name("num").into(),
        StringField::new("s").with_name("text").into(),
    ]));
    t.mutate();
    t.render();
    let info = t.get_info();
    assert_eq!(info["field"]["name"], "num");
    assert_eq!(info["field"]["field type"], "BitField");
    assert_eq!(info["test/current index"], 0);
    assert!(info["field"]["value/rendered/hex"].is_string());
    assert!(info["template/hash"].is_string());
}
