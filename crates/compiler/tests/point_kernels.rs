//! End-to-end point kernel tests.

use vexel_grid::{AttrType, AttributeArray, PointDataGrid, Transform};
use vexelc::{Compiler, CompilerOptions};

fn compile_and_run(source: &str, grid: &mut PointDataGrid) {
    let compiler = Compiler::new();
    let exe = compiler
        .compile_point(source, &CompilerOptions::default())
        .unwrap_or_else(|e| panic!("compile failed: {}", e));
    exe.execute(grid).unwrap();
}

#[test]
fn test_translate_positions() {
    let mut grid = PointDataGrid::from_positions(
        Transform::new(1.0),
        &[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [9.0, 0.0, 0.0]],
    );
    compile_and_run("v@P += {0.0f, 1.0f, 0.0f};", &mut grid);
    assert_eq!(
        grid.positions(),
        vec![[0.0, 1.0, 0.0], [1.0, 3.0, 3.0], [9.0, 1.0, 0.0]]
    );
}

#[test]
fn test_scalar_attribute_round_trip() {
    let mut grid =
        PointDataGrid::from_positions(Transform::new(1.0), &[[0.5, 0.5, 0.5], [2.5, 0.5, 0.5]]);
    compile_and_run("f@mass = v@P.x * 2.0f;", &mut grid);
    let (index, ty) = grid.attribute_index("mass").unwrap();
    assert_eq!(ty, AttrType::F32);
    match grid.leaves()[0].attr(index) {
        AttributeArray::F32(values) => assert_eq!(values.as_slice(), &[1.0, 5.0]),
        other => panic!("f32 column expected, found {:?}", other.attr_type()),
    }
}

#[test]
fn test_group_membership() {
    let mut grid = PointDataGrid::from_positions(
        Transform::new(1.0),
        &[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
        ],
    );
    compile_and_run(r#"if (v@P.x > 0.5f) addtogroup("right");"#, &mut grid);
    assert_eq!(grid.group_size("right"), 3);

    // A second kernel reads the membership back and removes one point.
    compile_and_run(
        r#"i@in = 0;
           if (ingroup("right")) i@in = 1;
           if (v@P.x > 5.0f) removefromgroup("right");"#,
        &mut grid,
    );
    assert_eq!(grid.group_size("right"), 2);
    let (index, _) = grid.attribute_index("in").unwrap();
    let mut flags = Vec::new();
    for leaf in grid.leaves() {
        match leaf.attr(index) {
            AttributeArray::I32(values) => flags.extend_from_slice(values),
            _ => panic!("i32 column expected"),
        }
    }
    assert_eq!(flags, vec![0, 1, 1, 1]);
}

#[test]
fn test_ingroup_of_unknown_group_is_false() {
    let mut grid = PointDataGrid::from_positions(Transform::new(1.0), &[[0.0; 3]]);
    compile_and_run(
        r#"i@hit = 0; if (ingroup("nothing")) i@hit = 1;"#,
        &mut grid,
    );
    let (index, _) = grid.attribute_index("hit").unwrap();
    match grid.leaves()[0].attr(index) {
        AttributeArray::I32(values) => assert_eq!(values.as_slice(), &[0]),
        _ => panic!("i32 column expected"),
    }
}

#[test]
fn test_per_point_loop() {
    let mut grid =
        PointDataGrid::from_positions(Transform::new(1.0), &[[0.0; 3], [1.0, 0.0, 0.0]]);
    compile_and_run(
        "f@acc = 0.0f;\n\
         for (int i = 0; i < 4; ++i) f@acc += v@P.x + 1.0f;",
        &mut grid,
    );
    let (index, _) = grid.attribute_index("acc").unwrap();
    match grid.leaves()[0].attr(index) {
        AttributeArray::F32(values) => assert_eq!(values.as_slice(), &[4.0, 8.0]),
        _ => panic!("f32 column expected"),
    }
}

#[test]
fn test_existing_attribute_is_reused() {
    let mut grid = PointDataGrid::from_positions(Transform::new(1.0), &[[0.0; 3], [1.0; 3]]);
    let index = grid.ensure_attribute("mass", AttrType::F32);
    if let AttributeArray::F32(values) = grid.leaves_mut()[0].attr_mut(index) {
        values[0] = 10.0;
        values[1] = 20.0;
    }
    compile_and_run("f@mass += 1.0f;", &mut grid);
    match grid.leaves()[0].attr(index) {
        AttributeArray::F32(values) => assert_eq!(values.as_slice(), &[11.0, 21.0]),
        _ => panic!("f32 column expected"),
    }
}
