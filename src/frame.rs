// =============================================================================
// FRAME SUBMISSION CYCLE
// =============================================================================
//
// A fixed ring of frame slots. Each slot owns a fence and two semaphores
// (see backend::sync::FrameSync). The ring decides WHEN to wait, acquire,
// submit and present; a FrameDriver decides HOW (Vulkan in the renderer,
// a simulated GPU in the tests below).
//
// PER FRAME:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  wait fence[i] ─> acquire (signals acquire_sem[i]) ─> wait image     │
// │  owner ─> reset fence[i] ─> submit (waits acquire_sem[i], signals    │
// │  render_sem[i] + fence[i]) ─> present (waits render_sem[i]) ─> i+1   │
// └──────────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use ash::vk;

/// Errors on the per-frame path that the application cannot recover from.
///
/// An out-of-date swapchain is NOT an error: it is reported through
/// [`Acquired::OutOfDate`] / [`Presented::OutOfDate`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("GPU device was lost")]
    DeviceLost,
    #[error("presentation surface was lost")]
    SurfaceLost,
    #[error("Vulkan call failed: {0}")]
    Api(vk::Result),
    #[error("failed to update per-image data: {0}")]
    Upload(String),
}

impl From<vk::Result> for FrameError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost,
            vk::Result::ERROR_SURFACE_LOST_KHR => FrameError::SurfaceLost,
            other => FrameError::Api(other),
        }
    }
}

/// Outcome of asking the swapchain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Outcome of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Done { suboptimal: bool },
    OutOfDate,
}

/// What happened during one call to [`FrameRing::draw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and queued for presentation.
    /// `suboptimal` asks the caller to recreate the swapchain soon.
    Presented {
        slot: usize,
        image_index: u32,
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface. Recreate it and all
    /// dependent resources before drawing again.
    OutOfDate,
}

/// The GPU-facing half of the frame cycle.
///
/// `slot` is always in `0..slots`, `image_index` is whatever
/// `acquire_image` handed out.
pub trait FrameDriver {
    /// Block until the fence of `slot` is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Acquire the next swapchain image, signaling the acquire semaphore of `slot`.
    fn acquire_image(&mut self, slot: usize) -> Result<Acquired, FrameError>;

    /// Return the fence of `slot` to the unsignaled state.
    fn reset_slot(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Refresh per-image data (uniforms) before the image's commands are replayed.
    fn prepare_image(&mut self, image_index: u32) -> Result<(), FrameError>;

    /// Submit the pre-recorded commands of `image_index` using the sync objects of `slot`.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError>;

    /// Queue `image_index` for presentation once the render semaphore of `slot` fires.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented, FrameError>;
}

/// Ring of frame slots plus swapchain image ownership.
#[derive(Debug)]
pub struct FrameRing {
    slots: usize,
    current: usize,
    /// Which slot last submitted work that renders into each image
    image_owners: Vec<Option<usize>>,
    frames_submitted: u64,
}

impl FrameRing {
    pub fn new(slots: usize, images: usize) -> Self {
        assert!(slots > 0, "frame ring needs at least one slot");
        Self {
            slots,
            current: 0,
            image_owners: vec![None; images],
            frames_submitted: 0,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Forget image ownership after the swapchain was rebuilt.
    ///
    /// Callers wait for device idle before rebuilding, so no old
    /// submission can still touch the new images.
    pub fn reset_images(&mut self, images: usize) {
        self.image_owners.clear();
        self.image_owners.resize(images, None);
    }

    /// Run one iteration of the submission cycle.
    pub fn draw<D: FrameDriver>(&mut self, driver: &mut D) -> Result<FrameStatus, FrameError> {
        let slot = self.current;

        driver.wait_for_slot(slot)?;

        let (image_index, acquire_suboptimal) = match driver.acquire_image(slot)? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            // Fence stays signaled: nothing will be submitted on this slot
            Acquired::OutOfDate => return Ok(FrameStatus::OutOfDate),
        };

        let image = image_index as usize;
        if image >= self.image_owners.len() {
            self.image_owners.resize(image + 1, None);
        }
        if let Some(owner) = self.image_owners[image] {
            if owner != slot {
                driver.wait_for_slot(owner)?;
            }
        }
        self.image_owners[image] = Some(slot);

        driver.reset_slot(slot)?;
        driver.prepare_image(image_index)?;
        driver.submit(slot, image_index)?;
        self.frames_submitted += 1;

        let present = driver.present(slot, image_index)?;
        self.current = (self.current + 1) % self.slots;

        match present {
            Presented::Done { suboptimal } => Ok(FrameStatus::Presented {
                slot,
                image_index,
                suboptimal: suboptimal || acquire_suboptimal,
            }),
            Presented::OutOfDate => Ok(FrameStatus::OutOfDate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::{HashSet, VecDeque};

    // ─────────────────────────────────────────────────────────────────────
    // Simulated GPU
    // ─────────────────────────────────────────────────────────────────────
    //
    // Submissions stay outstanding until the CPU waits on their fence or
    // the GPU is told to catch up. Every misuse of a sync object that the
    // validation layers would flag is counted instead of panicking.

    #[derive(Default, Clone)]
    struct SlotState {
        fence_signaled: bool,
        pending: Option<u64>,
        acquire_pending: bool,
    }

    #[derive(Default)]
    struct SimulatedGpu {
        slots: Vec<SlotState>,
        image_count: u32,
        next_image: u32,
        image_writers: Vec<Option<u64>>,
        outstanding: HashSet<u64>,
        completion_order: VecDeque<u64>,
        next_submission: u64,

        max_outstanding: usize,
        races: usize,
        deadlocks: usize,
        presented: Vec<u32>,
        prepared: Vec<u32>,

        out_of_date_on_acquire: Option<u64>,
        out_of_date_on_present: Option<u64>,
        suboptimal_on_acquire: Option<u64>,
        suboptimal_on_present: Option<u64>,
        /// Hand out images in this order instead of round-robin
        image_sequence: Vec<u32>,
        lose_device_on_submit: Option<u64>,
        acquire_calls: u64,
        present_calls: u64,
        /// Retire the oldest submission every n-th acquire
        retire_every: Option<u64>,
    }

    impl SimulatedGpu {
        fn new(slots: usize, images: u32) -> Self {
            Self {
                slots: vec![
                    SlotState {
                        fence_signaled: true,
                        ..Default::default()
                    };
                    slots
                ],
                image_count: images,
                image_writers: vec![None; images as usize],
                ..Default::default()
            }
        }

        fn retire(&mut self, submission: u64) {
            if !self.outstanding.remove(&submission) {
                return;
            }
            for slot in &mut self.slots {
                if slot.pending == Some(submission) {
                    slot.pending = None;
                    slot.fence_signaled = true;
                }
            }
            for writer in &mut self.image_writers {
                if *writer == Some(submission) {
                    *writer = None;
                }
            }
        }

        fn retire_oldest(&mut self) {
            while let Some(id) = self.completion_order.pop_front() {
                if self.outstanding.contains(&id) {
                    self.retire(id);
                    return;
                }
            }
        }
    }

    impl FrameDriver for SimulatedGpu {
        fn wait_for_slot(&mut self, slot: usize) -> Result<(), FrameError> {
            let SlotState {
                fence_signaled,
                pending,
                ..
            } = self.slots[slot].clone();
            if fence_signaled {
                return Ok(());
            }
            match pending {
                Some(id) => {
                    // Submissions on one queue retire in order
                    while self.outstanding.contains(&id) {
                        self.retire_oldest();
                    }
                    Ok(())
                }
                None => {
                    self.deadlocks += 1;
                    Ok(())
                }
            }
        }

        fn acquire_image(&mut self, slot: usize) -> Result<Acquired, FrameError> {
            self.acquire_calls += 1;
            if let Some(every) = self.retire_every {
                if self.acquire_calls % every == 0 {
                    self.retire_oldest();
                }
            }
            if self.out_of_date_on_acquire == Some(self.acquire_calls) {
                return Ok(Acquired::OutOfDate);
            }
            if self.slots[slot].acquire_pending {
                // Semaphore signaled twice without a wait in between
                self.races += 1;
            }
            self.slots[slot].acquire_pending = true;
            let index = if self.image_sequence.is_empty() {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                index
            } else {
                let at = (self.acquire_calls - 1) as usize % self.image_sequence.len();
                self.image_sequence[at]
            };
            Ok(Acquired::Image {
                index,
                suboptimal: self.suboptimal_on_acquire == Some(self.acquire_calls),
            })
        }

        fn reset_slot(&mut self, slot: usize) -> Result<(), FrameError> {
            self.slots[slot].fence_signaled = false;
            Ok(())
        }

        fn prepare_image(&mut self, image_index: u32) -> Result<(), FrameError> {
            if self.image_writers[image_index as usize].is_some() {
                // CPU writes uniforms the GPU may still be reading
                self.races += 1;
            }
            self.prepared.push(image_index);
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError> {
            let id = self.next_submission;
            self.next_submission += 1;
            if self.lose_device_on_submit == Some(id) {
                return Err(vk::Result::ERROR_DEVICE_LOST.into());
            }

            let state = &mut self.slots[slot];
            if state.pending.is_some() {
                self.races += 1;
            }
            state.pending = Some(id);
            state.acquire_pending = false;

            if self.image_writers[image_index as usize].is_some() {
                self.races += 1;
            }
            self.image_writers[image_index as usize] = Some(id);

            self.outstanding.insert(id);
            self.completion_order.push_back(id);
            self.max_outstanding = self.max_outstanding.max(self.outstanding.len());
            Ok(())
        }

        fn present(&mut self, _slot: usize, image_index: u32) -> Result<Presented, FrameError> {
            self.present_calls += 1;
            if self.out_of_date_on_present == Some(self.present_calls) {
                return Ok(Presented::OutOfDate);
            }
            self.presented.push(image_index);
            Ok(Presented::Done {
                suboptimal: self.suboptimal_on_present == Some(self.present_calls),
            })
        }
    }

    fn run(ring: &mut FrameRing, gpu: &mut SimulatedGpu, frames: usize) {
        for _ in 0..frames {
            ring.draw(gpu).unwrap();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Properties
    // ─────────────────────────────────────────────────────────────────────

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(8)]
    fn outstanding_frames_never_exceed_slot_count(#[case] n: usize) {
        let mut ring = FrameRing::new(n, n);
        let mut gpu = SimulatedGpu::new(n, n as u32);

        run(&mut ring, &mut gpu, 500);

        assert!(gpu.max_outstanding <= n, "{} > {}", gpu.max_outstanding, n);
        // A GPU that never catches up on its own still reaches the bound
        assert_eq!(gpu.max_outstanding, n);
        assert_eq!(gpu.races, 0);
        assert_eq!(gpu.deadlocks, 0);
    }

    #[rstest]
    #[case(2, 1)]
    #[case(3, 2)]
    #[case(3, 5)]
    fn gpu_catching_up_early_keeps_the_bound(#[case] n: usize, #[case] retire_every: u64) {
        let mut ring = FrameRing::new(n, n);
        let mut gpu = SimulatedGpu::new(n, n as u32);
        gpu.retire_every = Some(retire_every);

        run(&mut ring, &mut gpu, 300);

        assert!(gpu.max_outstanding <= n);
        assert_eq!(gpu.races, 0);
    }

    #[rstest]
    #[case(2, 2)]
    #[case(3, 3)]
    #[case(2, 3)]
    #[case(3, 4)]
    #[case(1, 3)]
    fn presented_images_cycle_through_every_index(#[case] slots: usize, #[case] images: usize) {
        let mut ring = FrameRing::new(slots, images);
        let mut gpu = SimulatedGpu::new(slots, images as u32);

        run(&mut ring, &mut gpu, images * 10);

        let expected: HashSet<u32> = (0..images as u32).collect();
        for round in gpu.presented.chunks(images) {
            let seen: HashSet<u32> = round.iter().copied().collect();
            assert_eq!(seen, expected, "round {:?} is not a permutation", round);
        }
        assert_eq!(gpu.presented.len(), images * 10);
        // Every image is prepared before it is presented, in the same order
        assert_eq!(gpu.prepared, gpu.presented);
        assert_eq!(gpu.races, 0);
    }

    #[test]
    fn acquired_index_flows_through_to_prepare_and_present() {
        // The presentation engine may hand images back out of order
        let sequence = vec![2, 0, 3, 1, 1, 3, 0, 2];
        let mut ring = FrameRing::new(2, 4);
        let mut gpu = SimulatedGpu::new(2, 4);
        gpu.image_sequence = sequence.clone();

        let indices: Vec<u32> = (0..sequence.len())
            .map(|_| match ring.draw(&mut gpu).unwrap() {
                FrameStatus::Presented { image_index, .. } => image_index,
                FrameStatus::OutOfDate => panic!("unexpected out of date"),
            })
            .collect();

        assert_eq!(indices, sequence);
        assert_eq!(gpu.prepared, sequence);
        assert_eq!(gpu.presented, sequence);
        assert_eq!(gpu.races, 0);
        assert!(gpu.max_outstanding <= 2);
    }

    #[rstest]
    #[case::on_acquire(true, false)]
    #[case::on_present(false, true)]
    #[case::on_both(true, true)]
    fn suboptimal_is_reported_with_a_presented_frame(
        #[case] on_acquire: bool,
        #[case] on_present: bool,
    ) {
        let mut ring = FrameRing::new(2, 2);
        let mut gpu = SimulatedGpu::new(2, 2);
        if on_acquire {
            gpu.suboptimal_on_acquire = Some(2);
        }
        if on_present {
            gpu.suboptimal_on_present = Some(2);
        }

        assert_eq!(
            ring.draw(&mut gpu).unwrap(),
            FrameStatus::Presented {
                slot: 0,
                image_index: 0,
                suboptimal: false
            }
        );
        assert_eq!(
            ring.draw(&mut gpu).unwrap(),
            FrameStatus::Presented {
                slot: 1,
                image_index: 1,
                suboptimal: true
            }
        );
        // The frame went out: fence reset, work submitted, ring advanced
        assert!(!gpu.slots[1].fence_signaled);
        assert_eq!(gpu.slots[1].pending, Some(1));
        assert_eq!(ring.frames_submitted(), 2);
        assert_eq!(ring.current_slot(), 0);
        assert_eq!(gpu.presented, vec![0, 1]);
    }

    #[test]
    fn slots_advance_modulo_ring_size() {
        let mut ring = FrameRing::new(3, 3);
        let mut gpu = SimulatedGpu::new(3, 3);

        let slots: Vec<usize> = (0..7)
            .map(|_| match ring.draw(&mut gpu).unwrap() {
                FrameStatus::Presented { slot, .. } => slot,
                FrameStatus::OutOfDate => panic!("unexpected out of date"),
            })
            .collect();

        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ring.frames_submitted(), 7);
    }

    #[test]
    fn fewer_slots_than_images_waits_on_image_owner() {
        // Two slots over three images: image 0 comes back under slot 1
        let mut ring = FrameRing::new(2, 3);
        let mut gpu = SimulatedGpu::new(2, 3);

        run(&mut ring, &mut gpu, 60);

        assert_eq!(gpu.races, 0);
        assert!(gpu.max_outstanding <= 2);
        assert_eq!(gpu.prepared, gpu.presented);
    }

    #[test]
    fn skipping_the_fence_wait_is_detected_as_a_race() {
        let mut gpu = SimulatedGpu::new(2, 2);

        // Drive slot 0 twice without waiting in between
        for _ in 0..2 {
            let image = match gpu.acquire_image(0).unwrap() {
                Acquired::Image { index, .. } => index,
                Acquired::OutOfDate => unreachable!(),
            };
            gpu.reset_slot(0).unwrap();
            gpu.submit(0, image).unwrap();
        }

        assert!(gpu.races > 0);
        assert_eq!(gpu.max_outstanding, 2);
    }

    #[test]
    fn out_of_date_acquire_leaves_fence_signaled() {
        let mut ring = FrameRing::new(2, 2);
        let mut gpu = SimulatedGpu::new(2, 2);
        gpu.out_of_date_on_acquire = Some(3);

        run(&mut ring, &mut gpu, 2);
        assert_eq!(ring.draw(&mut gpu).unwrap(), FrameStatus::OutOfDate);
        // Slot did not advance and its fence was not reset
        assert_eq!(ring.current_slot(), 0);
        assert!(gpu.slots[0].fence_signaled);

        ring.reset_images(2);
        run(&mut ring, &mut gpu, 10);

        assert_eq!(gpu.deadlocks, 0);
        assert_eq!(gpu.races, 0);
        assert_eq!(ring.frames_submitted(), 12);
    }

    #[test]
    fn out_of_date_present_still_advances_the_ring() {
        let mut ring = FrameRing::new(2, 2);
        let mut gpu = SimulatedGpu::new(2, 2);
        gpu.out_of_date_on_present = Some(1);

        assert_eq!(ring.draw(&mut gpu).unwrap(), FrameStatus::OutOfDate);
        assert_eq!(ring.current_slot(), 1);
        assert_eq!(ring.frames_submitted(), 1);

        run(&mut ring, &mut gpu, 5);
        assert_eq!(gpu.deadlocks, 0);
    }

    #[test]
    fn device_loss_is_fatal() {
        let mut ring = FrameRing::new(2, 2);
        let mut gpu = SimulatedGpu::new(2, 2);
        gpu.lose_device_on_submit = Some(4);

        run(&mut ring, &mut gpu, 4);
        let err = ring.draw(&mut gpu).unwrap_err();

        assert!(matches!(err, FrameError::DeviceLost));
    }

    #[test]
    fn vulkan_results_map_to_frame_errors() {
        assert!(matches!(
            FrameError::from(vk::Result::ERROR_SURFACE_LOST_KHR),
            FrameError::SurfaceLost
        ));
        assert!(matches!(
            FrameError::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            FrameError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }

    #[test]
    fn reset_images_resizes_ownership_table() {
        let mut ring = FrameRing::new(2, 2);
        let mut gpu = SimulatedGpu::new(2, 4);
        run(&mut ring, &mut gpu, 3);

        ring.reset_images(4);
        assert_eq!(ring.image_owners, vec![None; 4]);
    }
}
