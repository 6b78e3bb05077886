//! End-to-end volume kernel tests: compile a snippet, run it against
//! in-memory grids and check the voxel values that come back.

use vexel_grid::{Coord, Grid, GridSet, Transform, VolumeGrid};
use vexelc::{Compiler, CompilerOptions, DiagnosticKind};

fn float_grid(name: &str, values: &[(Coord, f32)]) -> VolumeGrid {
    let mut grid = Grid::<f32>::new(name, Transform::default());
    for &(ijk, v) in values {
        grid.set_value(ijk, v);
    }
    VolumeGrid::F32(grid)
}

fn run_volume(source: &str, grids: &mut GridSet) {
    run_volume_with(source, grids, &CompilerOptions::default());
}

fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn run_volume_with(source: &str, grids: &mut GridSet, options: &CompilerOptions) {
    init_tracing();
    let compiler = Compiler::new();
    let exe = compiler
        .compile_volume(source, options)
        .unwrap_or_else(|e| panic!("compile failed: {}", e));
    exe.execute(grids).unwrap();
}

fn f32_value(grids: &GridSet, name: &str, ijk: Coord) -> f32 {
    match grids.find(name) {
        Some(VolumeGrid::F32(g)) => g.value(ijk),
        other => panic!("grid '{}' missing or not f32: {:?}", name, other.map(|g| g.attr_type())),
    }
}

fn i32_value(grids: &GridSet, name: &str, ijk: Coord) -> i32 {
    match grids.find(name) {
        Some(VolumeGrid::I32(g)) => g.value(ijk),
        other => panic!("grid '{}' missing or not i32: {:?}", name, other.map(|g| g.attr_type())),
    }
}

#[test]
fn test_density_increment() {
    let mut grids = GridSet::new();
    grids.push(float_grid(
        "density",
        &[(Coord::new(0, 0, 0), 2.0), (Coord::new(1, 0, 0), 3.5)],
    ));
    run_volume("@density = @density + 1.0f;", &mut grids);
    assert_eq!(f32_value(&grids, "density", Coord::new(0, 0, 0)), 3.0);
    assert_eq!(f32_value(&grids, "density", Coord::new(1, 0, 0)), 4.5);
}

#[test]
fn test_conditional_creates_int_attribute() {
    let mut grids = GridSet::new();
    grids.push(float_grid(
        "density",
        &[(Coord::new(0, 0, 0), 4.0), (Coord::new(1, 0, 0), 6.0)],
    ));
    run_volume("i@count = 0; if (@density > 5.0f) i@count = 1;", &mut grids);
    assert_eq!(i32_value(&grids, "count", Coord::new(0, 0, 0)), 0);
    assert_eq!(i32_value(&grids, "count", Coord::new(1, 0, 0)), 1);
}

#[test]
fn test_narrowing_assignment_truncates() {
    // i@a starts at 3; doubling gives 6 and the `+ 0.5` is lost in the
    // float→int narrowing.
    let mut grid = Grid::<i32>::new("a", Transform::default());
    grid.set_value(Coord::new(0, 0, 0), 3);
    let mut grids = GridSet::new();
    grids.push(VolumeGrid::I32(grid));

    let compiler = Compiler::new();
    let options = CompilerOptions::default().with_implicit_float_to_int(true);
    let exe = compiler
        .compile_volume("i@a = i@a * 2; i@a = i@a + 0.5;", &options)
        .unwrap();
    assert!(
        exe.warnings()
            .iter()
            .any(|w| w.kind == DiagnosticKind::NarrowingWarning)
    );
    exe.execute(&mut grids).unwrap();
    assert_eq!(i32_value(&grids, "a", Coord::new(0, 0, 0)), 6);
}

#[test]
fn test_while_loop_and_crement() {
    let mut grids = GridSet::new();
    grids.push(float_grid("sum", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume(
        "int i = 0; float total = 0.0f;\n\
         while (i < 5) { total += float(i); ++i; }\n\
         @sum = total;",
        &mut grids,
    );
    assert_eq!(f32_value(&grids, "sum", Coord::new(0, 0, 0)), 10.0);
}

#[test]
fn test_for_loop_break_continue() {
    let mut grids = GridSet::new();
    grids.push(float_grid("t", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume(
        "float t = 0.0f;\n\
         for (int i = 0; i < 10; ++i) {\n\
             if (i == 3) continue;\n\
             if (i > 5) break;\n\
             t += 1.0f;\n\
         }\n\
         @t = t;",
        &mut grids,
    );
    // i = 0, 1, 2, 4, 5 contribute.
    assert_eq!(f32_value(&grids, "t", Coord::new(0, 0, 0)), 5.0);
}

#[test]
fn test_do_while_runs_once() {
    let mut grids = GridSet::new();
    grids.push(float_grid("n", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume("do { @n += 1.0f; } while (false);", &mut grids);
    assert_eq!(f32_value(&grids, "n", Coord::new(0, 0, 0)), 1.0);
}

#[test]
fn test_short_circuit_guards_division() {
    // The RHS of && must not evaluate when the guard is false; a plain
    // (non-short-circuit) evaluation would trap on the zero divide.
    let mut grids = GridSet::new();
    grids.push(float_grid(
        "d",
        &[(Coord::new(0, 0, 0), 0.0), (Coord::new(1, 0, 0), 4.0)],
    ));
    run_volume(
        "int n = int(@d);\n\
         if (n != 0 && 8 / n == 2) @d = 100.0f;",
        &mut grids,
    );
    assert_eq!(f32_value(&grids, "d", Coord::new(0, 0, 0)), 0.0);
    assert_eq!(f32_value(&grids, "d", Coord::new(1, 0, 0)), 100.0);
}

#[test]
fn test_vector_ops() {
    let mut grids = GridSet::new();
    grids.push(float_grid("len", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume(
        "v@n = normalize(cross({1.0f, 0.0f, 0.0f}, {0.0f, 1.0f, 0.0f}));\n\
         @len = length({3.0f, 4.0f, 0.0f}) + dot(v@n, v@n);",
        &mut grids,
    );
    assert_eq!(f32_value(&grids, "len", Coord::new(0, 0, 0)), 6.0);
    match grids.find("n") {
        Some(VolumeGrid::Vec3F(g)) => {
            assert_eq!(g.value(Coord::new(0, 0, 0)), [0.0, 0.0, 1.0]);
        }
        other => panic!("vec3f grid expected: {:?}", other.map(|g| g.attr_type())),
    }
}

#[test]
fn test_vector_compound_assign_promotes_elementwise() {
    let mut grid = Grid::<[f32; 3]>::new("v", Transform::default());
    grid.set_value(Coord::new(0, 0, 0), [1.0, 2.0, 3.0]);
    let mut grids = GridSet::new();
    grids.push(VolumeGrid::Vec3F(grid));
    // The integer pack promotes elementwise to vec3f.
    run_volume("v@v += {0, 1, 0}; v@v.z = 9.0f;", &mut grids);
    match grids.find("v") {
        Some(VolumeGrid::Vec3F(g)) => {
            assert_eq!(g.value(Coord::new(0, 0, 0)), [1.0, 3.0, 9.0]);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_pack_unpack_round_trip() {
    let mut grids = GridSet::new();
    grids.push(float_grid("x", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume(
        "v@t = {0.1f, 2.5f, -3.25f};\n\
         @x = v@t.x; @y = v@t.y; @z = v@t.z;",
        &mut grids,
    );
    assert_eq!(f32_value(&grids, "x", Coord::new(0, 0, 0)), 0.1);
    assert_eq!(f32_value(&grids, "y", Coord::new(0, 0, 0)), 2.5);
    assert_eq!(f32_value(&grids, "z", Coord::new(0, 0, 0)), -3.25);
}

#[test]
fn test_matrix_builtins() {
    let mut grids = GridSet::new();
    grids.push(float_grid("d", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume(
        "m4@m = mmult(identity4(), identity4());\n\
         v@p = transformv({1.0f, 2.0f, 3.0f}, m4@m);\n\
         @d = m4@m[5] + m4@m[1];",
        &mut grids,
    );
    assert_eq!(f32_value(&grids, "d", Coord::new(0, 0, 0)), 1.0);
    match grids.find("p") {
        Some(VolumeGrid::Vec3F(g)) => {
            assert_eq!(g.value(Coord::new(0, 0, 0)), [1.0, 2.0, 3.0]);
        }
        _ => panic!("vec3f grid expected"),
    }
}

#[test]
fn test_coordinate_builtins_and_transform() {
    let mut grid = Grid::<f32>::new("d", Transform::new(0.5));
    grid.set_value(Coord::new(2, 0, 0), 1.0);
    grid.set_value(Coord::new(4, 2, 0), 1.0);
    let mut grids = GridSet::new();
    grids.push(VolumeGrid::F32(grid));
    run_volume(
        "@d = float(getcoordx() + getcoordy());\n\
         v@pws = getvoxelpws();",
        &mut grids,
    );
    assert_eq!(f32_value(&grids, "d", Coord::new(2, 0, 0)), 2.0);
    assert_eq!(f32_value(&grids, "d", Coord::new(4, 2, 0)), 6.0);
    match grids.find("pws") {
        Some(VolumeGrid::Vec3F(g)) => {
            assert_eq!(g.value(Coord::new(2, 0, 0)), [1.0, 0.0, 0.0]);
            assert_eq!(g.value(Coord::new(4, 2, 0)), [2.0, 1.0, 0.0]);
        }
        _ => panic!("vec3f grid expected"),
    }
}

#[test]
fn test_math_externals() {
    let mut grids = GridSet::new();
    grids.push(float_grid("s", &[(Coord::new(0, 0, 0), 0.0)]));
    run_volume("@s = sin(0.0f) + pow(2.0f, 3.0f) + sqrt(9.0f);", &mut grids);
    assert_eq!(f32_value(&grids, "s", Coord::new(0, 0, 0)), 11.0);
}

#[test]
fn test_custom_data_lookup() {
    let mut grids = GridSet::new();
    grids.push(float_grid("g", &[(Coord::new(0, 0, 0), 0.0)]));
    let options = CompilerOptions::default()
        .with_custom_data(vec![("gain".to_string(), 2.5), ("bias".to_string(), -1.0)]);
    run_volume_with(r#"@g = lookupf("gain") + lookupf("bias");"#, &mut grids, &options);
    assert_eq!(f32_value(&grids, "g", Coord::new(0, 0, 0)), 1.5);
}

#[test]
fn test_bool_attribute() {
    let mut grids = GridSet::new();
    grids.push(float_grid(
        "d",
        &[(Coord::new(0, 0, 0), 0.5), (Coord::new(1, 0, 0), 2.0)],
    ));
    run_volume("b@hot = @d > 1.0f;", &mut grids);
    match grids.find("hot") {
        Some(VolumeGrid::Bool(g)) => {
            assert_eq!(g.value(Coord::new(0, 0, 0)), 0);
            assert_eq!(g.value(Coord::new(1, 0, 0)), 1);
        }
        _ => panic!("bool grid expected"),
    }
}

#[test]
fn test_execution_is_pure() {
    // Identical inputs produce identical outputs, run after run.
    let build = || {
        let mut grids = GridSet::new();
        grids.push(float_grid(
            "density",
            &[
                (Coord::new(0, 0, 0), 1.5),
                (Coord::new(7, 7, 7), -2.0),
                (Coord::new(16, 0, 3), 0.25),
            ],
        ));
        grids
    };
    let compiler = Compiler::new();
    let exe = compiler
        .compile_volume(
            "@density = @density * 2.0f + float(rand(42.0) > 2.0);",
            &CompilerOptions::default(),
        )
        .unwrap();

    let mut a = build();
    let mut b = build();
    exe.execute(&mut a).unwrap();
    exe.execute(&mut b).unwrap();
    for ijk in [Coord::new(0, 0, 0), Coord::new(7, 7, 7), Coord::new(16, 0, 3)] {
        assert_eq!(f32_value(&a, "density", ijk), f32_value(&b, "density", ijk));
    }
    assert_eq!(f32_value(&a, "density", Coord::new(0, 0, 0)), 3.0);
}

#[test]
fn test_leaves_are_independent() {
    // Values in one leaf depend only on that leaf's inputs: each voxel
    // of a three-leaf grid maps through the same pure function.
    let coords = [
        Coord::new(0, 0, 0),
        Coord::new(3, 1, 2),
        Coord::new(9, 0, 0),
        Coord::new(-1, -1, -1),
    ];
    let mut grids = GridSet::new();
    grids.push(float_grid(
        "d",
        &coords
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as f32))
            .collect::<Vec<_>>(),
    ));
    run_volume("@d = @d * 10.0f + 1.0f;", &mut grids);
    for (i, &ijk) in coords.iter().enumerate() {
        assert_eq!(f32_value(&grids, "d", ijk), i as f32 * 10.0 + 1.0);
    }
}

#[test]
fn test_return_skips_rest() {
    let mut grids = GridSet::new();
    grids.push(float_grid(
        "d",
        &[(Coord::new(0, 0, 0), 1.0), (Coord::new(1, 0, 0), 5.0)],
    ));
    run_volume("if (@d < 2.0f) return; @d = 0.0f;", &mut grids);
    assert_eq!(f32_value(&grids, "d", Coord::new(0, 0, 0)), 1.0);
    assert_eq!(f32_value(&grids, "d", Coord::new(1, 0, 0)), 0.0);
}

#[test]
fn test_mixed_precision_promotion() {
    // f32 + i64 promotes to f32 under the precedence order.
    let mut grid = Grid::<i64>::new("big", Transform::default());
    grid.set_value(Coord::new(0, 0, 0), 3);
    let mut grids = GridSet::new();
    grids.push(VolumeGrid::I64(grid));
    grids.push(float_grid("out", &[(Coord::new(0, 0, 0), 0.5)]));
    run_volume("@out = @out + l@big;", &mut grids);
    assert_eq!(f32_value(&grids, "out", Coord::new(0, 0, 0)), 3.5);
}
