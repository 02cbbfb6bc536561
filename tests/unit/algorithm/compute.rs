use std::cell::Cell;
use std::rc::Rc;

use super::*;
use crate::foundation::core::PixelFormat;

#[derive(Debug, Default)]
struct Probe {
    valid: Cell<bool>,
    allocations: Cell<u32>,
    releases: Cell<u32>,
    last_radius: Cell<u32>,
}

#[derive(Debug)]
struct FakeContext(Rc<Probe>);

impl ComputeContext for FakeContext {
    fn is_valid(&self) -> bool {
        self.0.valid.get()
    }

    fn allocate(&mut self, _size: Size) -> BlurResult<()> {
        self.0.allocations.set(self.0.allocations.get() + 1);
        Ok(())
    }

    fn blur(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _size: Size,
        radius: u32,
    ) -> BlurResult<()> {
        self.0.last_radius.set(radius);
        for (o, i) in output.iter_mut().zip(input) {
            *o = i / 2;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.0.releases.set(self.0.releases.get() + 1);
    }
}

fn probe() -> Rc<Probe> {
    let p = Rc::new(Probe::default());
    p.valid.set(true);
    p
}

fn white(w: u32, h: u32) -> Bitmap {
    let mut b = Bitmap::new(Size::new(w, h), PixelFormat::Rgba8Premul).unwrap();
    b.data_mut().fill(200);
    b
}

#[test]
fn reuses_allocation_until_size_changes() {
    let p = probe();
    let mut alg = ComputeBlur::new(Box::new(FakeContext(p.clone())), true);
    let mut a = white(4, 4);
    alg.blur(&mut a, 8.0).unwrap();
    alg.blur(&mut a, 8.0).unwrap();
    assert_eq!(p.allocations.get(), 1);
    assert_eq!(a.pixel(0, 0), Some([50, 50, 50, 50]));

    let mut b = white(8, 4);
    alg.blur(&mut b, 8.0).unwrap();
    assert_eq!(p.allocations.get(), 2);
    assert_eq!(alg.allocated_size(), Some(Size::new(8, 4)));
}

#[test]
fn clamps_radius_to_kernel_range() {
    let p = probe();
    let mut alg = ComputeBlur::new(Box::new(FakeContext(p.clone())), true);
    let mut b = white(2, 2);
    alg.blur(&mut b, 100.0).unwrap();
    assert_eq!(p.last_radius.get(), MAX_COMPUTE_RADIUS);
    alg.blur(&mut b, 0.0).unwrap();
    assert_eq!(p.last_radius.get(), MIN_COMPUTE_RADIUS);
    assert!(alg.blur(&mut b, -3.0).is_err());
}

#[test]
fn out_of_place_returns_a_new_buffer() {
    let p = probe();
    let mut alg = ComputeBlur::new(Box::new(FakeContext(p)), false);
    assert!(!alg.can_modify_bitmap());
    let mut b = white(2, 2);
    let out = alg.blur(&mut b, 4.0).unwrap().unwrap();
    assert_ne!(out.id(), b.id());
    assert_eq!(out.pixel(1, 1), Some([100, 100, 100, 100]));
    assert_eq!(b.pixel(1, 1), Some([200, 200, 200, 200]));
}

#[test]
fn invalidated_context_is_a_backend_error() {
    let p = probe();
    let mut alg = ComputeBlur::new(Box::new(FakeContext(p.clone())), true);
    let mut b = white(2, 2);
    p.valid.set(false);
    assert!(matches!(alg.blur(&mut b, 4.0), Err(BlurError::Backend(_))));
    assert_eq!(b.pixel(0, 0), Some([200, 200, 200, 200]));
}

#[test]
fn teardown_releases_once() {
    let p = probe();
    {
        let mut alg = ComputeBlur::new(Box::new(FakeContext(p.clone())), true);
        alg.teardown();
        alg.teardown();
        let mut b = white(2, 2);
        assert!(matches!(alg.blur(&mut b, 4.0), Err(BlurError::Backend(_))));
    }
    assert_eq!(p.releases.get(), 1);
}
