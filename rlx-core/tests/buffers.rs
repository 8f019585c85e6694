use candle_core::{Device, Result, Tensor};
use rlx_core::buffers::ExperienceBuffer;
use rlx_core::buffers::prioritized::PrioritizedReplayBuffer;
use rlx_core::buffers::replay_buffer::ReplayBuffer;
use rlx_core::buffers::sequence_buffer::SequenceBuffer;

fn state(value: f32, device: &Device) -> Result<Tensor> {
    Tensor::from_vec(vec![value, value + 0.5], 2, device)
}

fn action(value: f32, device: &Device) -> Result<Tensor> {
    Tensor::from_vec(vec![value], 1, device)
}

#[test]
fn uniform_buffer_wraps_around_capacity() -> Result<()> {
    let device = Device::Cpu;
    let mut buffer = ReplayBuffer::new(4);
    for i in 0..6 {
        buffer.push(
            state(i as f32, &device)?,
            action(0., &device)?,
            i as f32,
            false,
            state(i as f32 + 1., &device)?,
        );
    }
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.capacity(), 4);

    let batch = buffer.sample(3)?;
    assert_eq!(batch.states.dims(), &[3, 2]);
    assert_eq!(batch.actions.dims(), &[3, 1]);
    assert_eq!(batch.rewards.dims(), &[3, 1]);
    assert_eq!(batch.dones.dims(), &[3, 1]);
    assert!(batch.weights.is_none());
    assert!(batch.indexes.is_none());

    // Slots 0 and 1 were overwritten, so rewards 0 and 1 are gone.
    let rewards = batch.rewards.flatten_all()?.to_vec1::<f32>()?;
    assert!(rewards.iter().all(|r| *r >= 2.));
    Ok(())
}

#[test]
fn sampling_leaves_stored_entries_unchanged() -> Result<()> {
    let device = Device::Cpu;
    let mut buffer = ReplayBuffer::new(4);
    for i in 0..6 {
        buffer.push(
            state(i as f32, &device)?,
            action(i as f32, &device)?,
            i as f32,
            false,
            state(i as f32 + 1., &device)?,
        );
    }
    for _ in 0..20 {
        let batch = buffer.sample(8)?;
        let rewards = batch.rewards.flatten_all()?.to_vec1::<f32>()?;
        let actions = batch.actions.flatten_all()?.to_vec1::<f32>()?;
        let states = batch.states.to_vec2::<f32>()?;
        let next_states = batch.next_states.to_vec2::<f32>()?;
        for (k, r) in rewards.iter().enumerate() {
            // Every sampled row must still be one of the four surviving transitions,
            // with its fields mutually consistent.
            assert!((2. ..=5.).contains(r));
            assert_eq!(actions[k], *r);
            assert_eq!(states[k], vec![*r, *r + 0.5]);
            assert_eq!(next_states[k], vec![*r + 1., *r + 1.5]);
        }
    }
    assert_eq!(buffer.len(), 4);
    Ok(())
}

#[test]
fn prioritized_sampling_leaves_stored_entries_unchanged() -> Result<()> {
    let device = Device::Cpu;
    let mut buffer = PrioritizedReplayBuffer::new(8, 0.6, 0.4, 10);
    for i in 0..5 {
        buffer.push(
            state(i as f32, &device)?,
            action(i as f32, &device)?,
            i as f32,
            false,
            state(i as f32 + 1., &device)?,
        );
    }
    buffer.update_priorities(&[0, 2], &[5., 0.5]);
    for _ in 0..20 {
        let batch = buffer.sample(4)?;
        let rewards = batch.rewards.flatten_all()?.to_vec1::<f32>()?;
        let actions = batch.actions.flatten_all()?.to_vec1::<f32>()?;
        let states = batch.states.to_vec2::<f32>()?;
        for (k, r) in rewards.iter().enumerate() {
            assert!((0. ..=4.).contains(r));
            assert_eq!(actions[k], *r);
            assert_eq!(states[k], vec![*r, *r + 0.5]);
        }
    }
    assert_eq!(buffer.len(), 5);
    Ok(())
}

#[test]
fn prioritized_buffer_normalizes_weights_and_accepts_feedback() -> Result<()> {
    let device = Device::Cpu;
    let mut buffer = PrioritizedReplayBuffer::new(8, 0.6, 0.4, 10);
    for i in 0..5 {
        buffer.push(
            state(i as f32, &device)?,
            action(0., &device)?,
            i as f32,
            false,
            state(i as f32 + 1., &device)?,
        );
    }
    let batch = buffer.sample(4)?;
    let weights = batch.weights.as_ref().unwrap();
    assert_eq!(weights.dims(), &[4, 1]);
    let weights = weights.flatten_all()?.to_vec1::<f32>()?;
    assert!(weights.iter().all(|w| *w > 0. && *w <= 1.));
    let indexes = batch.indexes.as_ref().unwrap();
    assert_eq!(indexes.len(), 4);
    assert!(indexes.iter().all(|i| *i < 5));

    buffer.update_priorities(&[0, 1], &[10., 0.01]);
    let batch = buffer.sample(4)?;
    assert!(batch.weights.is_some());
    Ok(())
}

#[test]
fn sequence_buffer_materializes_overlapping_windows() -> Result<()> {
    let device = Device::Cpu;
    let mut buffer = SequenceBuffer::new(10, 3);
    assert!(buffer.needs_reset());

    buffer.reset_episode(state(0., &device)?);
    for i in 0..5 {
        buffer.append(
            action(i as f32, &device)?,
            i as f32,
            false,
            state(i as f32 + 1., &device)?,
        )?;
    }
    // Windows complete from the third transition on.
    assert_eq!(buffer.len(), 3);

    buffer.reset_episode(state(100., &device)?);
    buffer.append(action(0., &device)?, 0., false, state(101., &device)?)?;
    buffer.append(action(1., &device)?, 0., false, state(102., &device)?)?;
    assert_eq!(buffer.len(), 3);
    buffer.append(action(2., &device)?, 0., true, state(103., &device)?)?;
    assert_eq!(buffer.len(), 4);

    let batch = buffer.sample(2)?;
    assert_eq!(batch.states.dims(), &[2, 4, 2]);
    assert_eq!(batch.actions.dims(), &[2, 3, 1]);
    assert_eq!(batch.rewards.dims(), &[2, 3, 1]);
    assert_eq!(batch.dones.dims(), &[2, 3, 1]);
    Ok(())
}
