use super::*;

#[test]
fn test_position_to_index_roundtrip() {
  let size = [4, 3, 2];
  for z in 0..size[2] {
    for y in 0..size[1] {
      for x in 0..size[0] {
        let idx = position_to_index([x, y, z], size);
        assert_eq!(
          index_to_position(idx, size),
          [x, y, z],
          "Roundtrip failed for ({}, {}, {})",
          x,
          y,
          z
        );
      }
    }
  }
}

#[test]
fn test_axis_zero_is_fastest() {
  let size = [4, 3, 2];
  assert_eq!(position_to_index([1, 0, 0], size), 1);
  assert_eq!(position_to_index([0, 1, 0], size), 4);
  assert_eq!(position_to_index([0, 0, 1], size), 12);
  assert_eq!(position_to_index([3, 2, 1], size), 23);
}

#[test]
fn test_default_queue_slots_nonzero() {
  assert!(QUEUE_SLOTS_PER_WORKER > 0);
  assert!(PROGRESS_STEPS > 0);
}
