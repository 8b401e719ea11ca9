use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::FrameTarget;
use crate::renderer::error::AcquireOutcome;
use crate::renderer::internals::swapchain::MAX_FRAMES_IN_FLIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Recording,
    RenderPass,
}

/// Drives the begin / render pass / end cycle over a [`FrameTarget`].
///
/// Owns one command buffer per frame slot and the slot index itself. The
/// index advances once per `end_frame`, whether presentation succeeded or not,
/// so the next frame always waits on a different fence than the one just submitted.
pub struct FrameController<T: FrameTarget> {
    target: T,
    command_buffers: [vk::CommandBuffer; MAX_FRAMES_IN_FLIGHT],
    frame_index: usize,
    state: FrameState,
    image_index: u32,

    window_extent: vk::Extent2D,
    resize_requested: bool,
}

impl<T: FrameTarget> FrameController<T> {
    pub fn new(mut target: T) -> Result<Self> {
        let command_buffers = target.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
        let command_buffers: [vk::CommandBuffer; MAX_FRAMES_IN_FLIGHT] =
            match command_buffers.try_into() {
                Ok(buffers) => buffers,
                Err(buffers) => {
                    let buffers: Vec<vk::CommandBuffer> = buffers;
                    target.free_command_buffers(&buffers);
                    return Err(eyre!(
                        "Expected {} command buffers, got {}",
                        MAX_FRAMES_IN_FLIGHT,
                        buffers.len(),
                    ));
                }
            };
        let window_extent = target.extent();

        Ok(Self {
            target,
            command_buffers,
            frame_index: 0,
            state: FrameState::Idle,
            image_index: 0,

            window_extent,
            resize_requested: false,
        })
    }

    /// Record a new window size. The swapchain is rebuilt at the next frame boundary.
    pub fn request_resize(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
        self.resize_requested = true;
    }

    /// Acquire an image and open this slot's command buffer.
    ///
    /// Returns `None` when no frame can be drawn right now: the window has
    /// zero area, the swapchain went stale, or the slot did not free up in time.
    /// The caller simply skips the frame.
    pub fn begin_frame(&mut self) -> Result<Option<vk::CommandBuffer>> {
        assert_eq!(
            self.state,
            FrameState::Idle,
            "begin_frame called while a frame is already in progress"
        );

        if is_zero_area(self.window_extent) {
            return Ok(None);
        }
        if self.resize_requested && !self.recreate()? {
            return Ok(None);
        }

        let image_index = match self.target.acquire_next_image(self.frame_index)? {
            AcquireOutcome::Ready(image_index) => image_index,
            outcome => {
                log::debug!("Skipping frame, acquire returned {:?}", outcome);
                self.recreate()?;
                return Ok(None);
            }
        };

        let command_buffer = self.command_buffers[self.frame_index];
        self.target.begin_commands(command_buffer)?;
        self.image_index = image_index;
        self.state = FrameState::Recording;

        Ok(Some(command_buffer))
    }

    pub fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        assert_eq!(
            self.state,
            FrameState::Recording,
            "begin_render_pass requires a recording frame with no open render pass"
        );
        self.assert_current(command_buffer);

        self.target.begin_render_pass(command_buffer, self.image_index);
        self.state = FrameState::RenderPass;
    }

    pub fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        assert_eq!(
            self.state,
            FrameState::RenderPass,
            "end_render_pass called without an open render pass"
        );
        self.assert_current(command_buffer);

        self.target.end_render_pass(command_buffer);
        self.state = FrameState::Recording;
    }

    pub fn end_frame(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        assert_eq!(
            self.state,
            FrameState::Recording,
            "end_frame requires a recording frame with its render pass closed"
        );
        self.assert_current(command_buffer);

        let slot = self.frame_index;
        let presented = match self.target.end_commands(command_buffer) {
            Ok(()) => self.target.present(slot, command_buffer, self.image_index),
            Err(e) => Err(e),
        };

        self.state = FrameState::Idle;
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        if presented?.needs_recreation() || self.resize_requested {
            self.recreate()?;
        }

        Ok(())
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.target.extent()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Returns whether the swapchain was rebuilt. Otherwise the request stays
    /// pending until the window and the surface both have area again.
    fn recreate(&mut self) -> Result<bool> {
        let rebuilt = !is_zero_area(self.window_extent)
            && self.target.recreate(self.window_extent)?;
        self.resize_requested = !rebuilt;
        Ok(rebuilt)
    }

    fn assert_current(&self, command_buffer: vk::CommandBuffer) {
        assert_eq!(
            command_buffer,
            self.command_buffers[self.frame_index],
            "command buffer does not belong to the current frame"
        );
    }
}

impl<T: FrameTarget> Drop for FrameController<T> {
    fn drop(&mut self) {
        self.target.free_command_buffers(&self.command_buffers);
    }
}

fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use ash::vk::Handle;
    use crate::renderer::error::PresentOutcome;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Acquire(usize),
        Begin(vk::CommandBuffer),
        End(vk::CommandBuffer),
        BeginPass(u32),
        EndPass,
        Present(usize, vk::CommandBuffer, u32),
        Recreate(vk::Extent2D),
        Free(usize),
    }

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 1280, height: 720 };

    struct MockTarget {
        extent: vk::Extent2D,
        // Scripted results, falling back to success once empty
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<Option<PresentOutcome>>,
        // Recreations that find a zero-area surface
        zero_area_surfaces: usize,
        calls: Rc<RefCell<Vec<Call>>>,
    }

    impl MockTarget {
        fn record(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl FrameTarget for MockTarget {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
            Ok((0..count as u64).map(|i| vk::CommandBuffer::from_raw(100 + i)).collect())
        }

        fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]) {
            self.record(Call::Free(command_buffers.len()));
        }

        fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.record(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Ready(slot as u32 + 10)))
        }

        fn begin_commands(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
            self.record(Call::Begin(command_buffer));
            Ok(())
        }

        fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
            self.record(Call::End(command_buffer));
            Ok(())
        }

        fn begin_render_pass(&mut self, _command_buffer: vk::CommandBuffer, image_index: u32) {
            self.record(Call::BeginPass(image_index));
        }

        fn end_render_pass(&mut self, _command_buffer: vk::CommandBuffer) {
            self.record(Call::EndPass);
        }

        fn present(
            &mut self,
            slot: usize,
            command_buffer: vk::CommandBuffer,
            image_index: u32,
        ) -> Result<PresentOutcome> {
            self.record(Call::Present(slot, command_buffer, image_index));
            match self.presents.pop_front() {
                Some(Some(outcome)) => Ok(outcome),
                Some(None) => Err(eyre!("device lost")),
                None => Ok(PresentOutcome::Presented),
            }
        }

        fn recreate(&mut self, extent: vk::Extent2D) -> Result<bool> {
            self.record(Call::Recreate(extent));
            if self.zero_area_surfaces > 0 {
                self.zero_area_surfaces -= 1;
                return Ok(false);
            }
            self.extent = extent;
            Ok(true)
        }
    }

    fn controller(
        acquires: &[AcquireOutcome],
        presents: &[Option<PresentOutcome>],
    ) -> (FrameController<MockTarget>, Rc<RefCell<Vec<Call>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let target = MockTarget {
            extent: EXTENT,
            acquires: acquires.iter().copied().collect(),
            presents: presents.iter().copied().collect(),
            zero_area_surfaces: 0,
            calls: calls.clone(),
        };
        (FrameController::new(target).unwrap(), calls)
    }

    fn run_frame(frames: &mut FrameController<MockTarget>) -> Result<bool> {
        let Some(cmd) = frames.begin_frame()? else {
            return Ok(false);
        };
        frames.begin_render_pass(cmd);
        frames.end_render_pass(cmd);
        frames.end_frame(cmd)?;
        Ok(true)
    }

    fn presents(calls: &Rc<RefCell<Vec<Call>>>) -> Vec<(usize, vk::CommandBuffer, u32)> {
        calls
            .borrow()
            .iter()
            .filter_map(|call| match *call {
                Call::Present(slot, cmd, image) => Some((slot, cmd, image)),
                _ => None,
            })
            .collect()
    }

    fn recreations(calls: &Rc<RefCell<Vec<Call>>>) -> Vec<vk::Extent2D> {
        calls
            .borrow()
            .iter()
            .filter_map(|call| match *call {
                Call::Recreate(extent) => Some(extent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn slots_cycle_and_each_uses_its_own_command_buffer() {
        let (mut frames, calls) = controller(&[], &[]);
        for _ in 0..3 {
            assert!(run_frame(&mut frames).unwrap());
        }

        let cmd = |i: u64| vk::CommandBuffer::from_raw(100 + i);
        assert_eq!(
            presents(&calls),
            vec![(0, cmd(0), 10), (1, cmd(1), 11), (0, cmd(0), 10)]
        );
        assert_eq!(frames.frame_index(), 1);
    }

    #[test]
    fn frame_calls_happen_in_order() {
        let (mut frames, calls) = controller(&[], &[]);
        run_frame(&mut frames).unwrap();

        let cmd = vk::CommandBuffer::from_raw(100);
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Acquire(0),
                Call::Begin(cmd),
                Call::BeginPass(10),
                Call::EndPass,
                Call::End(cmd),
                Call::Present(0, cmd, 10),
            ]
        );
    }

    #[test]
    fn stale_acquire_skips_the_frame_and_recreates() {
        let (mut frames, calls) = controller(&[AcquireOutcome::Stale], &[]);

        assert!(frames.begin_frame().unwrap().is_none());
        assert!(!frames.is_frame_in_progress());
        assert_eq!(recreations(&calls), vec![EXTENT]);
        // The skipped frame does not consume a slot
        assert_eq!(frames.frame_index(), 0);

        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(presents(&calls).len(), 1);
    }

    #[test]
    fn timed_out_acquire_skips_the_frame() {
        let (mut frames, calls) = controller(&[AcquireOutcome::TimedOut], &[]);

        assert!(!run_frame(&mut frames).unwrap());
        assert!(presents(&calls).is_empty());
        assert_eq!(frames.frame_index(), 0);
        assert!(run_frame(&mut frames).unwrap());
    }

    #[test]
    fn suboptimal_present_recreates_after_the_frame() {
        let (mut frames, calls) = controller(&[], &[Some(PresentOutcome::Suboptimal)]);

        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls), vec![EXTENT]);
        assert!(matches!(calls.borrow().last(), Some(Call::Recreate(_))));
        assert_eq!(frames.frame_index(), 1);
    }

    #[test]
    fn stale_present_recreates() {
        let (mut frames, calls) = controller(&[], &[Some(PresentOutcome::Stale)]);
        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls).len(), 1);
    }

    #[test]
    fn resize_request_recreates_before_acquiring() {
        let (mut frames, calls) = controller(&[], &[]);
        let resized = vk::Extent2D { width: 800, height: 600 };
        frames.request_resize(resized);

        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(calls.borrow()[0], Call::Recreate(resized));
        assert_eq!(calls.borrow()[1], Call::Acquire(0));
        assert_eq!(frames.extent(), resized);

        // Handled once only
        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls).len(), 1);
    }

    #[test]
    fn zero_area_window_skips_frames_until_restored() {
        let (mut frames, calls) = controller(&[], &[]);
        frames.request_resize(vk::Extent2D { width: 0, height: 0 });

        assert!(!run_frame(&mut frames).unwrap());
        assert!(!run_frame(&mut frames).unwrap());
        assert!(calls.borrow().is_empty());

        let restored = vk::Extent2D { width: 640, height: 480 };
        frames.request_resize(restored);
        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls), vec![restored]);
    }

    #[test]
    fn zero_area_surface_keeps_the_resize_pending() {
        let (mut frames, calls) = controller(&[], &[]);
        frames.target.zero_area_surfaces = 2;
        let resized = vk::Extent2D { width: 800, height: 600 };
        frames.request_resize(resized);

        // No acquire happens while the surface cannot be rebuilt
        assert!(!run_frame(&mut frames).unwrap());
        assert!(!run_frame(&mut frames).unwrap());
        assert_eq!(*calls.borrow(), vec![Call::Recreate(resized), Call::Recreate(resized)]);
        assert_eq!(frames.extent(), EXTENT);

        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls).len(), 3);
        assert_eq!(frames.extent(), resized);

        // Handled once the surface was rebuilt
        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls).len(), 3);
    }

    #[test]
    fn stale_acquire_on_a_zero_area_surface_retries_next_frame() {
        let (mut frames, calls) = controller(&[AcquireOutcome::Stale], &[]);
        frames.target.zero_area_surfaces = 1;

        assert!(!run_frame(&mut frames).unwrap());
        assert_eq!(recreations(&calls), vec![EXTENT]);

        assert!(run_frame(&mut frames).unwrap());
        assert_eq!(calls.borrow()[2], Call::Recreate(EXTENT));
        assert_eq!(calls.borrow()[3], Call::Acquire(0));
    }

    #[test]
    fn present_error_still_advances_the_slot() {
        let (mut frames, _calls) = controller(&[], &[None]);

        let cmd = frames.begin_frame().unwrap().unwrap();
        frames.begin_render_pass(cmd);
        frames.end_render_pass(cmd);

        assert!(frames.end_frame(cmd).is_err());
        assert!(!frames.is_frame_in_progress());
        assert_eq!(frames.frame_index(), 1);
    }

    #[test]
    fn drop_frees_command_buffers() {
        let (frames, calls) = controller(&[], &[]);
        drop(frames);
        assert_eq!(*calls.borrow(), vec![Call::Free(MAX_FRAMES_IN_FLIGHT)]);
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn begin_frame_twice_panics() {
        let (mut frames, _calls) = controller(&[], &[]);
        frames.begin_frame().unwrap();
        frames.begin_frame().unwrap();
    }

    #[test]
    #[should_panic(expected = "render pass closed")]
    fn end_frame_with_open_render_pass_panics() {
        let (mut frames, _calls) = controller(&[], &[]);
        let cmd = frames.begin_frame().unwrap().unwrap();
        frames.begin_render_pass(cmd);
        let _ = frames.end_frame(cmd);
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn foreign_command_buffer_panics() {
        let (mut frames, _calls) = controller(&[], &[]);
        frames.begin_frame().unwrap();
        frames.begin_render_pass(vk::CommandBuffer::from_raw(999));
    }
}
