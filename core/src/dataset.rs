use crate::{
    decode::{decode_images, decode_labels},
    error::DatasetError,
};

/// Fixed dimensions of a sprite dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatasetShape {
    /// Pixels per image.
    pub image_size: usize,
    pub num_classes: usize,
    pub num_elements: usize,
    /// Elements in the train partition; the remainder is the test partition.
    pub num_train: usize,
}

impl DatasetShape {
    /// The sprited MNIST set: 65000 digits of 28x28 pixels, 55000 used for training.
    pub const MNIST: Self = Self {
        image_size: 28 * 28,
        num_classes: 10,
        num_elements: 65_000,
        num_train: 55_000,
    };

    pub fn num_test(&self) -> usize {
        self.num_elements.saturating_sub(self.num_train)
    }

    pub fn pixel_count(&self) -> usize {
        self.num_elements * self.image_size
    }

    pub fn label_count(&self) -> usize {
        self.num_elements * self.num_classes
    }

    /// Side length of a square image, if `image_size` is a perfect square.
    pub fn image_side(&self) -> Option<usize> {
        let side = (self.image_size as f64).sqrt().round() as usize;
        (side * side == self.image_size).then_some(side)
    }
}

/// Every image and label of the dataset, immutable once built.
#[derive(Clone, Debug)]
pub struct RawDataset {
    shape: DatasetShape,
    images: Vec<f32>,
    labels: Vec<u8>,
}

impl RawDataset {
    /// Decode cached sprite-sheet and label bytes.
    pub fn decode(
        image_bytes: &[u8],
        label_bytes: &[u8],
        shape: DatasetShape,
    ) -> Result<Self, DatasetError> {
        let images = decode_images(image_bytes, &shape)?;
        let labels = decode_labels(label_bytes, &shape)?;
        Self::from_parts(images, labels, shape)
    }

    pub fn from_parts(
        images: Vec<f32>,
        labels: Vec<u8>,
        shape: DatasetShape,
    ) -> Result<Self, DatasetError> {
        if images.len() != shape.pixel_count() {
            return Err(DatasetError::ShapeMismatch {
                what: "image buffer",
                expected: shape.pixel_count(),
                actual: images.len(),
            });
        }
        if labels.len() != shape.label_count() {
            return Err(DatasetError::ShapeMismatch {
                what: "label buffer",
                expected: shape.label_count(),
                actual: labels.len(),
            });
        }
        if shape.num_train > shape.num_elements {
            return Err(DatasetError::ShapeMismatch {
                what: "train partition",
                expected: shape.num_elements,
                actual: shape.num_train,
            });
        }

        Ok(Self {
            shape,
            images,
            labels,
        })
    }

    pub fn shape(&self) -> &DatasetShape {
        &self.shape
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Split into `(train_images, train_labels, test_images, test_labels)`.
    pub(crate) fn split(self) -> (Vec<f32>, Vec<u8>, Vec<f32>, Vec<u8>) {
        let Self {
            shape,
            mut images,
            mut labels,
        } = self;
        let test_images = images.split_off(shape.num_train * shape.image_size);
        let test_labels = labels.split_off(shape.num_train * shape.num_classes);
        (images, labels, test_images, test_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY: DatasetShape = DatasetShape {
        image_size: 2,
        num_classes: 2,
        num_elements: 2,
        num_train: 1,
    };

    #[test]
    fn mnist_dimensions() {
        let shape = DatasetShape::MNIST;
        assert_eq!(shape.num_test(), 10_000);
        assert_eq!(shape.pixel_count(), 65_000 * 784);
        assert_eq!(shape.label_count(), 650_000);
        assert_eq!(shape.image_side(), Some(28));
    }

    #[test]
    fn rejects_short_label_buffer() {
        let err = RawDataset::from_parts(vec![0.0; 4], vec![1, 0, 0], TINY).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ShapeMismatch {
                what: "label buffer",
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn split_is_contiguous() {
        let raw = RawDataset::from_parts(vec![0.0, 1.0, 0.5, 0.25], vec![1, 0, 0, 1], TINY).unwrap();
        let (train_images, train_labels, test_images, test_labels) = raw.split();

        assert_eq!(train_images, vec![0.0, 1.0]);
        assert_eq!(train_labels, vec![1, 0]);
        assert_eq!(test_images, vec![0.5, 0.25]);
        assert_eq!(test_labels, vec![0, 1]);
    }
}
