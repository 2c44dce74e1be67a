use std::fmt;

use rand::Rng;

use crate::{
    dataset::{DatasetShape, RawDataset},
    error::DatasetError,
    rng::shuffled_indices,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKind {
    Train,
    Test,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("train"),
            Self::Test => f.write_str("test"),
        }
    }
}

/// A fixed permutation of partition-local indices and a wrapping position.
///
/// Draws advance the position before reading it, so the first index handed out
/// is `permutation[1]` and `permutation[0]` comes last in each cycle.
#[derive(Clone, Debug)]
pub struct ShuffledCursor {
    permutation: Vec<usize>,
    position: usize,
}

impl ShuffledCursor {
    pub fn new(permutation: Vec<usize>) -> Self {
        Self {
            permutation,
            position: 0,
        }
    }

    pub fn shuffled<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        Self::new(shuffled_indices(len, rng))
    }

    pub fn len(&self) -> usize {
        self.permutation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permutation.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Advance and return the next index, or `None` for an empty permutation.
    pub fn next_index(&mut self) -> Option<usize> {
        if self.permutation.is_empty() {
            return None;
        }
        self.position = (self.position + 1) % self.permutation.len();
        Some(self.permutation[self.position])
    }
}

/// A contiguous slice of the dataset with its own cursor.
#[derive(Clone, Debug)]
pub struct Partition {
    kind: PartitionKind,
    images: Vec<f32>,
    labels: Vec<u8>,
    cursor: ShuffledCursor,
    image_size: usize,
    num_classes: usize,
}

impl Partition {
    fn new(
        kind: PartitionKind,
        images: Vec<f32>,
        labels: Vec<u8>,
        cursor: ShuffledCursor,
        shape: &DatasetShape,
    ) -> Self {
        Self {
            kind,
            images,
            labels,
            cursor,
            image_size: shape.image_size,
            num_classes: shape.num_classes,
        }
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.cursor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }

    pub fn cursor(&self) -> &ShuffledCursor {
        &self.cursor
    }

    /// Copy the next `batch_size` samples out of the partition.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Batch, DatasetError> {
        let mut batch = Batch::with_capacity(batch_size, self.image_size, self.num_classes);

        for _ in 0..batch_size {
            let idx = self
                .cursor
                .next_index()
                .ok_or(DatasetError::EmptyPartition(self.kind))?;

            let image = &self.images[idx * self.image_size..(idx + 1) * self.image_size];
            let label = &self.labels[idx * self.num_classes..(idx + 1) * self.num_classes];
            batch.push(image, label);
        }

        Ok(batch)
    }
}

/// Train and test partitions of a decoded dataset.
#[derive(Clone, Debug)]
pub struct MnistData {
    shape: DatasetShape,
    train: Partition,
    test: Partition,
}

impl MnistData {
    /// Partition the dataset and draw an independent permutation for each side.
    pub fn new<R: Rng + ?Sized>(raw: RawDataset, rng: &mut R) -> Self {
        let shape = *raw.shape();
        let train_cursor = ShuffledCursor::shuffled(shape.num_train, rng);
        let test_cursor = ShuffledCursor::shuffled(shape.num_test(), rng);
        Self::from_checked(raw, train_cursor, test_cursor)
    }

    /// Partition the dataset with caller-provided permutations.
    ///
    /// Each permutation must cover exactly its partition and only hold
    /// partition-local indices.
    pub fn with_cursors(
        raw: RawDataset,
        train: ShuffledCursor,
        test: ShuffledCursor,
    ) -> Result<Self, DatasetError> {
        let shape = *raw.shape();
        check_cursor(&train, shape.num_train, PartitionKind::Train)?;
        check_cursor(&test, shape.num_test(), PartitionKind::Test)?;
        Ok(Self::from_checked(raw, train, test))
    }

    fn from_checked(raw: RawDataset, train: ShuffledCursor, test: ShuffledCursor) -> Self {
        let shape = *raw.shape();
        let (train_images, train_labels, test_images, test_labels) = raw.split();

        Self {
            shape,
            train: Partition::new(PartitionKind::Train, train_images, train_labels, train, &shape),
            test: Partition::new(PartitionKind::Test, test_images, test_labels, test, &shape),
        }
    }

    pub fn shape(&self) -> &DatasetShape {
        &self.shape
    }

    pub fn partition(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Train => &self.train,
            PartitionKind::Test => &self.test,
        }
    }

    pub fn next_batch(&mut self, kind: PartitionKind, batch_size: usize) -> Result<Batch, DatasetError> {
        match kind {
            PartitionKind::Train => self.train.next_batch(batch_size),
            PartitionKind::Test => self.test.next_batch(batch_size),
        }
    }

    pub fn next_train_batch(&mut self, batch_size: usize) -> Result<Batch, DatasetError> {
        self.train.next_batch(batch_size)
    }

    pub fn next_test_batch(&mut self, batch_size: usize) -> Result<Batch, DatasetError> {
        self.test.next_batch(batch_size)
    }
}

fn check_cursor(
    cursor: &ShuffledCursor,
    partition_len: usize,
    kind: PartitionKind,
) -> Result<(), DatasetError> {
    let (what, range) = match kind {
        PartitionKind::Train => ("train permutation", "train permutation index range"),
        PartitionKind::Test => ("test permutation", "test permutation index range"),
    };

    if cursor.len() != partition_len {
        return Err(DatasetError::ShapeMismatch {
            what,
            expected: partition_len,
            actual: cursor.len(),
        });
    }
    // an index `i` needs a partition of at least `i + 1` samples
    if let Some(&idx) = cursor.permutation().iter().find(|&&idx| idx >= partition_len) {
        return Err(DatasetError::ShapeMismatch {
            what: range,
            expected: partition_len,
            actual: idx + 1,
        });
    }
    Ok(())
}

/// Flattened images and one-hot labels for `len` samples, owned by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    images: Vec<f32>,
    labels: Vec<u8>,
    len: usize,
    image_size: usize,
    num_classes: usize,
}

impl Batch {
    fn with_capacity(len: usize, image_size: usize, num_classes: usize) -> Self {
        Self {
            images: Vec::with_capacity(len * image_size),
            labels: Vec::with_capacity(len * num_classes),
            len: 0,
            image_size,
            num_classes,
        }
    }

    fn push(&mut self, image: &[f32], label: &[u8]) {
        self.images.extend_from_slice(image);
        self.labels.extend_from_slice(label);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn image(&self, i: usize) -> &[f32] {
        &self.images[i * self.image_size..(i + 1) * self.image_size]
    }

    pub fn label(&self, i: usize) -> &[u8] {
        &self.labels[i * self.num_classes..(i + 1) * self.num_classes]
    }

    /// Index of the hot entry in row `i`; ties resolve to the first maximum.
    pub fn class_of(&self, i: usize) -> usize {
        let label = self.label(i);
        label
            .iter()
            .enumerate()
            .fold(0, |best, (class, &value)| if value > label[best] { class } else { best })
    }

    pub fn classes(&self) -> Vec<usize> {
        (0..self.len).map(|i| self.class_of(i)).collect()
    }

    /// Copy of the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut batch = Self::with_capacity(indices.len(), self.image_size, self.num_classes);
        for &i in indices {
            batch.push(self.image(i), self.label(i));
        }
        batch
    }
}
