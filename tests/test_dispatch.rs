// tests/test_dispatch.rs — Integration tests for execution grids and the
// dispatch lifecycle state machine.
//
// Grid arithmetic and state transitions are pure host logic, exercised
// here through the public API. Launches that touch a real device live in
// the library's subprocess-isolated GPU tests.

use workgrid::dispatch::{DispatchState, GridShape};
use workgrid::error::ComputeError;

// ===== GridShape =====

#[test]
fn one_work_item_per_element() {
    assert_eq!(GridShape::D1(1).work_items(), 1);
    assert_eq!(GridShape::D1(1_000_000).work_items(), 1_000_000);
}

#[test]
fn one_work_item_per_pixel() {
    let grid = GridShape::D2 {
        width: 752,
        height: 480,
    };
    assert_eq!(grid.work_items(), 752 * 480);
}

#[test]
fn workgroups_cover_exact_multiples() {
    assert_eq!(GridShape::D1(2048).workgroups([256, 1, 1]), (8, 1, 1));
    let grid = GridShape::D2 {
        width: 752,
        height: 480,
    };
    // 752 / 16 = 47 exact, 480 / 8 = 60 exact.
    assert_eq!(grid.workgroups([16, 8, 1]), (47, 60, 1));
}

#[test]
fn workgroups_round_up_partial_tiles() {
    // A single trailing element still needs a whole workgroup; the kernel
    // guard discards the rest of it.
    assert_eq!(GridShape::D1(2049).workgroups([256, 1, 1]), (9, 1, 1));
    let grid = GridShape::D2 {
        width: 33,
        height: 17,
    };
    assert_eq!(grid.workgroups([16, 8, 1]), (3, 3, 1));
}

#[test]
fn minimum_grids() {
    assert_eq!(GridShape::D1(1).workgroups([256, 1, 1]), (1, 1, 1));
    let grid = GridShape::D2 {
        width: 1,
        height: 1,
    };
    assert_eq!(grid.workgroups([16, 8, 1]), (1, 1, 1));
}

#[test]
fn large_2d_grid_does_not_overflow_work_items() {
    let grid = GridShape::D2 {
        width: u32::MAX,
        height: 2,
    };
    assert_eq!(grid.work_items(), u32::MAX as u64 * 2);
}

// ===== DispatchState =====

#[test]
fn lifecycle_advances_in_order() {
    let mut state = DispatchState::Unconfigured;
    let chain = [
        DispatchState::DeviceSelected,
        DispatchState::ProgramCompiled,
        DispatchState::BuffersStaged,
        DispatchState::Launched,
        DispatchState::Completed,
    ];
    for next in chain {
        assert_eq!(state.successor(), Some(next));
        state.advance(next).unwrap();
    }
    assert!(state.is_terminal());
}

#[test]
fn no_step_may_be_skipped() {
    // Every forward jump of more than one step must be rejected.
    let order = [
        DispatchState::Unconfigured,
        DispatchState::DeviceSelected,
        DispatchState::ProgramCompiled,
        DispatchState::BuffersStaged,
        DispatchState::Launched,
        DispatchState::Completed,
    ];
    for (i, &from) in order.iter().enumerate() {
        for &target in &order[(i + 2).min(order.len())..] {
            let mut state = from;
            let err = state.advance(target).unwrap_err();
            assert!(
                matches!(err, ComputeError::InvalidDispatchState { .. }),
                "{from:?} → {target:?} should be invalid"
            );
            assert_eq!(state, from, "failed advance must not move the state");
        }
    }
}

#[test]
fn no_going_backwards() {
    let mut state = DispatchState::Launched;
    assert!(state
        .advance(DispatchState::BuffersStaged)
        .is_err());
}

#[test]
fn terminal_states_stay_terminal() {
    for state in [DispatchState::Completed, DispatchState::Failed] {
        assert!(state.is_terminal());
        assert_eq!(state.successor(), None);
        let mut s = state;
        assert!(s.advance(DispatchState::Launched).is_err());
    }
}
